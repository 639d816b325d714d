//! CLI argument parsing for the proofreading workflow.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "proofread",
    version,
    about = "Proofread documents with an LM and review the proposed corrections",
    after_help = "Examples:\n  proofread send chapter1.txt\n  proofread send chapter1.txt --lines 40-80\n  proofread review chapter1.txt\n  proofread apply chapter1.txt\n  proofread edit chapter1.txt\n  proofread send --stdin < notes.txt\n  proofread apply --stdin < notes.txt > fixed.txt\n  proofread cancel",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// JSON config file (default: <config dir>/proofread/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// LM command, split with shell quoting rules
    #[arg(long, global = true, value_name = "CMD")]
    pub command: Option<String>,

    /// Model identifier passed to the LM command
    #[arg(long, global = true, value_name = "ID")]
    pub model: Option<String>,

    /// Corrections file name, placed next to the document
    #[arg(long, global = true, value_name = "NAME")]
    pub output_file: Option<String>,

    /// Log progress to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Send a document to the LM and store its corrections
    Send(SendArgs),
    /// Apply every stored correction in one pass
    Apply(ApplyArgs),
    /// Confirm each stored correction before applying it
    Review(ReviewArgs),
    /// Open the corrections file in $VISUAL or $EDITOR
    Edit(EditArgs),
    /// Terminate the in-flight send, if any
    Cancel,
}

/// Send a document, or part of it, for proofreading.
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Document to proofread
    #[arg(value_name = "FILE", required_unless_present = "stdin")]
    pub file: Option<PathBuf>,

    /// Only send lines START-END (1-based, inclusive)
    #[arg(long, value_name = "START-END", conflicts_with = "stdin", value_parser = parse_line_range)]
    pub lines: Option<LineRange>,

    /// Read the text from stdin; corrections go to the default directory
    #[arg(long, conflicts_with = "file")]
    pub stdin: bool,
}

/// Apply stored corrections to a document.
#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Document the corrections were produced for
    #[arg(value_name = "FILE", required_unless_present = "stdin")]
    pub file: Option<PathBuf>,

    /// Read the text from stdin and print the corrected text; corrections
    /// come from the default directory
    #[arg(long, conflicts_with = "file")]
    pub stdin: bool,

    /// Report what would change without writing the document
    #[arg(long)]
    pub dry_run: bool,
}

/// Confirm stored corrections one by one.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// Document the corrections were produced for
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Report what would change without writing the document
    #[arg(long)]
    pub dry_run: bool,
}

/// Open the corrections file for manual editing.
#[derive(Parser, Debug)]
pub struct EditArgs {
    /// Document whose corrections file should be opened; without it, the
    /// file in the default directory written by `send --stdin`
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

fn parse_line_range(raw: &str) -> Result<LineRange, String> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got {raw:?}"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid start line {start:?}"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid end line {end:?}"))?;
    if start == 0 || end < start {
        return Err(format!("line range must satisfy 1 <= START <= END, got {raw}"));
    }
    Ok(LineRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn parses_line_ranges() {
        assert_eq!(
            parse_line_range("3-7"),
            Ok(LineRange { start: 3, end: 7 })
        );
        assert!(parse_line_range("0-2").is_err());
        assert!(parse_line_range("5-2").is_err());
        assert!(parse_line_range("5").is_err());
    }

    #[test]
    fn review_subcommand_accepts_dry_run() {
        let args = RootArgs::try_parse_from(["proofread", "review", "a.txt", "--dry-run"]).unwrap();
        match args.action {
            Action::Review(apply) => assert!(apply.dry_run),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn stdin_corrections_are_reachable_from_apply_and_edit() {
        let args = RootArgs::try_parse_from(["proofread", "apply", "--stdin"]).unwrap();
        match args.action {
            Action::Apply(apply) => assert!(apply.stdin && apply.file.is_none()),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(RootArgs::try_parse_from(["proofread", "apply"]).is_err());
        assert!(RootArgs::try_parse_from(["proofread", "apply", "a.txt", "--stdin"]).is_err());

        let args = RootArgs::try_parse_from(["proofread", "edit"]).unwrap();
        assert!(matches!(args.action, Action::Edit(EditArgs { file: None })));
    }

    #[test]
    fn send_requires_file_or_stdin() {
        assert!(RootArgs::try_parse_from(["proofread", "send"]).is_err());
        assert!(RootArgs::try_parse_from(["proofread", "send", "--stdin"]).is_ok());
        assert!(RootArgs::try_parse_from(["proofread", "send", "a.txt", "--stdin"]).is_err());
    }
}
