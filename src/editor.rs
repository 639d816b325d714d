use crate::error::ProofreadError;
use anyhow::{anyhow, Context, Result};
use shell_words::split as shell_split;
use std::path::Path;
use std::process::Command;

const EDITOR_VARS: [&str; 2] = ["VISUAL", "EDITOR"];
const FALLBACK_EDITOR: &str = "vi";

/// Open an existing corrections file in `$VISUAL`, `$EDITOR`, or `vi`.
pub fn open_in_editor(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ProofreadError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let cmd = editor_command(|var| std::env::var(var).ok())?;
    run_command(cmd, path)
}

/// Argv of the first non-blank editor variable, split with shell quoting.
///
/// A variable that does not split cleanly is an error rather than silently
/// falling through to the next one.
fn editor_command(lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<String>> {
    let configured = EDITOR_VARS.iter().find_map(|var| {
        lookup(var)
            .filter(|value| !value.trim().is_empty())
            .map(|value| (var, value))
    });
    let Some((var, value)) = configured else {
        return Ok(vec![FALLBACK_EDITOR.to_string()]);
    };
    shell_split(&value).with_context(|| format!("parse ${var}: {value}"))
}

fn run_command(mut cmd: Vec<String>, path: &Path) -> Result<()> {
    if cmd.is_empty() {
        return Err(anyhow!("missing editor command"));
    }
    let program = cmd.remove(0);
    let status = Command::new(&program)
        .args(cmd)
        .arg(path)
        .status()
        .with_context(|| format!("run editor {program}"))?;
    if !status.success() {
        return Err(anyhow!("editor {program} exited with {status}"));
    }
    Ok(())
}
