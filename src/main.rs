use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod apply;
mod cli;
mod config;
mod editor;
mod error;
mod extract;
mod prompt;
mod runner;
mod state;
mod store;

use apply::{apply_all, apply_interactive, TerminalConfirm};
use cli::{Action, ApplyArgs, LineRange, ReviewArgs, RootArgs, SendArgs};
use config::{load_config, Overrides, ProofreadConfig};
use error::ProofreadError;
use runner::{RunOutcome, Runner, SourceRef};
use store::{read_corrections, side_file_path, write_atomic, Correction};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let overrides = Overrides {
        config_path: args.config,
        command: args.command,
        model: args.model,
        output_file: args.output_file,
    };
    let config = load_config(&overrides)?;

    match args.action {
        Action::Send(send) => run_send(config, &send),
        Action::Apply(apply) => run_apply(&config, &apply),
        Action::Review(review) => run_review(&config, &review),
        Action::Edit(edit) => {
            editor::open_in_editor(&side_file_for(&config, edit.file.as_deref()))
        }
        Action::Cancel => run_cancel(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("PROOFREAD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Side file of `file`, or the default-directory one used for stdin text.
fn side_file_for(config: &ProofreadConfig, file: Option<&Path>) -> PathBuf {
    side_file_path(file, &config.default_dir, &config.output_file)
}

fn run_send(config: ProofreadConfig, args: &SendArgs) -> Result<()> {
    let (text, source) = match args.file.as_ref() {
        Some(path) if !args.stdin => {
            let text = load_text(path)?;
            let text = match args.lines {
                Some(range) => select_lines(&text, range)?,
                None => text,
            };
            (text, SourceRef::File(path.clone()))
        }
        _ => {
            let text = io::read_to_string(io::stdin()).context("read text from stdin")?;
            (text, SourceRef::Stdin)
        }
    };

    let state_dir = config.state_dir.clone();
    let mut runner = Runner::new(config);
    let handle = runner.send(&text, source)?;
    eprintln!(
        "Waiting for LM (pid {}); corrections go to {}",
        handle.pid,
        handle.output_path.display()
    );

    match runner.wait() {
        Ok(RunOutcome::Written {
            output_path,
            corrections,
        }) => {
            match corrections {
                Some(0) => println!("No corrections needed ({}).", output_path.display()),
                Some(count) => println!(
                    "Wrote {count} correction(s) to {}.",
                    output_path.display()
                ),
                None => println!("Wrote corrections to {}.", output_path.display()),
            }
            Ok(())
        }
        Ok(RunOutcome::Cancelled) => {
            println!("Request cancelled.");
            Ok(())
        }
        Err(err) => {
            if let Some((stdout, stderr)) = err
                .downcast_ref::<ProofreadError>()
                .and_then(ProofreadError::raw_output)
            {
                match state::save_last_output(&state_dir, stdout, stderr) {
                    Ok(path) => eprintln!("Raw LM output saved to {}", path.display()),
                    Err(save_err) => {
                        tracing::warn!(%save_err, "could not save raw LM output");
                        eprintln!("Raw LM output:\n{stdout}");
                    }
                }
            }
            Err(err)
        }
    }
}

fn run_apply(config: &ProofreadConfig, args: &ApplyArgs) -> Result<()> {
    let file = args.file.as_deref().filter(|_| !args.stdin);
    let corrections = read_corrections(&side_file_for(config, file))?;
    let Some(path) = file else {
        return apply_to_stdin(&corrections, args.dry_run);
    };
    if corrections.is_empty() {
        println!("No corrections.");
        return Ok(());
    }
    let mut text = load_text(path)?;
    let summary = apply_all(&mut text, &corrections);
    if summary.applied > 0 && !args.dry_run {
        write_atomic(path, text.as_bytes())?;
    }
    tracing::info!(
        applied = summary.applied,
        failed = summary.failed.len(),
        dry_run = args.dry_run,
        "bulk apply complete"
    );
    println!("{summary}");
    Ok(())
}

/// Stdin in, corrected text out; the summary goes to stderr.
fn apply_to_stdin(corrections: &[Correction], dry_run: bool) -> Result<()> {
    let mut text = io::read_to_string(io::stdin()).context("read text from stdin")?;
    let summary = apply_all(&mut text, corrections);
    if !dry_run {
        io::stdout()
            .write_all(text.as_bytes())
            .context("write corrected text")?;
    }
    eprintln!("{summary}");
    Ok(())
}

fn run_review(config: &ProofreadConfig, args: &ReviewArgs) -> Result<()> {
    let side_file = side_file_for(config, Some(&args.file));
    let corrections = read_corrections(&side_file)?;
    if corrections.is_empty() {
        println!("No corrections.");
        return Ok(());
    }
    let mut text = load_text(&args.file)?;
    let summary = {
        let mut confirm = TerminalConfirm::new(io::stdin().lock(), io::stdout());
        apply_interactive(&mut text, &corrections, &mut confirm)?
    };
    if summary.applied > 0 && !args.dry_run {
        write_atomic(&args.file, text.as_bytes())?;
    }
    println!("\n{summary}");
    Ok(())
}

fn run_cancel(config: &ProofreadConfig) -> Result<()> {
    let Some(marker) = state::load_live_marker(&config.state_dir)? else {
        println!("No proofreading request is running.");
        return Ok(());
    };
    state::terminate_group(marker.process_group, libc::SIGKILL)?;
    println!(
        "Cancelled request for {} (LM pid {}, started by pid {}).",
        marker.source_ref, marker.child_pid, marker.owner_pid
    );
    Ok(())
}

fn load_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Lines `start..=end` (1-based) with their line endings.
fn select_lines(text: &str, range: LineRange) -> Result<String> {
    let selected: String = text
        .split_inclusive('\n')
        .skip(range.start - 1)
        .take(range.end - range.start + 1)
        .collect();
    if selected.is_empty() {
        return Err(ProofreadError::EmptyRange {
            start: range.start,
            end: range.end,
        }
        .into());
    }
    Ok(selected)
}
