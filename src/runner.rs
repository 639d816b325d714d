//! LM subprocess lifecycle for a single proofreading request.
//!
//! `send` spawns the configured LM command, streams the prompt to its stdin and
//! returns at once. A watcher thread collects stdout until the child exits and
//! delivers one `RunExit` over a channel; `wait` consumes it and runs the
//! completion step exactly once. Only one run may be active: the
//! in-memory slot covers this process, the run marker covers other
//! `proofread` invocations.
//!
//! The LM runs as the leader of its own process group. Cancellation signals
//! the whole group, so helpers a wrapper script started die with it and the
//! stdout pipe closes.
use crate::config::ProofreadConfig;
use crate::error::ProofreadError;
use crate::extract::extract_json_array;
use crate::prompt::build_prompt;
use crate::state::{self, RunMarker};
use crate::store::{side_file_path, write_corrections};
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::io::{Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;

/// Where the text being proofread came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    File(PathBuf),
    Stdin,
}

impl SourceRef {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Stdin => None,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdin => write!(f, "<stdin>"),
        }
    }
}

/// Returned by `send`; identifies the run that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub pid: u32,
    pub output_path: PathBuf,
}

/// Successful end states of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The extracted array was written to `output_path`.
    Written {
        output_path: PathBuf,
        /// Element count when the array parses as JSON.
        corrections: Option<usize>,
    },
    Cancelled,
}

/// What the watcher thread reports when the child is gone.
struct RunExit {
    status: std::io::Result<ExitStatus>,
    stdout: Vec<u8>,
    stderr: String,
}

struct ActiveRun {
    pid: u32,
    source: SourceRef,
    output_path: PathBuf,
    events: Receiver<RunExit>,
    cancelled: bool,
    started: Instant,
}

pub struct Runner {
    config: ProofreadConfig,
    active: Option<ActiveRun>,
}

impl Runner {
    pub fn new(config: ProofreadConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// Start proofreading `text`. Fails with `AlreadyRunning` if a run is live.
    pub fn send(&mut self, text: &str, source: SourceRef) -> Result<RunHandle> {
        if let Some(active) = &self.active {
            return Err(ProofreadError::AlreadyRunning {
                source_ref: active.source.to_string(),
                pid: active.pid,
            }
            .into());
        }
        if let Some(marker) = state::load_live_marker(&self.config.state_dir)? {
            return Err(ProofreadError::AlreadyRunning {
                source_ref: marker.source_ref,
                pid: marker.child_pid,
            }
            .into());
        }

        let prompt = build_prompt(&self.config.prompt_template, text)?;
        let output_path = side_file_path(
            source.path(),
            &self.config.default_dir,
            &self.config.output_file,
        );

        let mut child = self.spawn_lm()?;
        let pid = child.id();
        let marker = RunMarker {
            child_pid: pid,
            process_group: pid,
            owner_pid: std::process::id(),
            source_ref: source.to_string(),
            output_path: output_path.clone(),
            started_at_epoch_ms: state::now_epoch_ms()?,
        };
        if let Err(err) = claim_marker(&self.config.state_dir, &marker) {
            let _ = state::terminate_group(pid, libc::SIGKILL);
            let _ = child.wait();
            return Err(err);
        }

        let events = spawn_io_threads(child, prompt.into_bytes())?;
        tracing::info!(
            pid,
            source = %source,
            output = %output_path.display(),
            prompt_bytes = text.len(),
            "lm request sent"
        );
        self.active = Some(ActiveRun {
            pid,
            source,
            output_path: output_path.clone(),
            events,
            cancelled: false,
            started: Instant::now(),
        });
        Ok(RunHandle { pid, output_path })
    }

    /// Kill the active subprocess. Returns false when nothing was running.
    pub fn cancel(&mut self) -> Result<bool> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        if !active.cancelled {
            active.cancelled = true;
            if let Err(err) = state::terminate_group(active.pid, libc::SIGKILL) {
                // The group may already have exited on its own.
                tracing::debug!(pid = active.pid, %err, "cancel signal not delivered");
            }
            tracing::info!(pid = active.pid, "lm request cancelled");
        }
        Ok(true)
    }

    /// Block until the active run finishes and complete it.
    pub fn wait(&mut self) -> Result<RunOutcome> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| anyhow!("no proofreading request is running"))?;
        let exit = active
            .events
            .recv()
            .map_err(|_| anyhow!("LM watcher exited without reporting"));
        self.complete(exit)
    }

    fn complete(&mut self, exit: Result<RunExit>) -> Result<RunOutcome> {
        let active = self
            .active
            .take()
            .ok_or_else(|| anyhow!("no proofreading request is running"))?;
        if let Err(err) = state::remove_marker_for(&self.config.state_dir, active.pid) {
            tracing::warn!(%err, "failed to clear run marker");
        }

        let exit = exit?;
        let status = exit.status.context("wait for LM command")?;
        tracing::info!(
            elapsed_ms = active.started.elapsed().as_millis(),
            response_bytes = exit.stdout.len(),
            %status,
            "lm invoke complete"
        );
        if active.cancelled {
            return Ok(RunOutcome::Cancelled);
        }

        let raw_output = String::from_utf8_lossy(&exit.stdout).into_owned();
        if !status.success() {
            return Err(ProofreadError::ProcessFailure {
                event: describe_status(&status),
                raw_output,
                stderr: exit.stderr,
            }
            .into());
        }
        let Some(array) = extract_json_array(&raw_output) else {
            return Err(ProofreadError::ExtractionFailed { raw_output }.into());
        };
        write_corrections(&active.output_path, array)?;
        let corrections = serde_json::from_str::<Vec<serde_json::Value>>(array)
            .ok()
            .map(|items| items.len());
        Ok(RunOutcome::Written {
            output_path: active.output_path,
            corrections,
        })
    }

    fn spawn_lm(&self) -> Result<Child> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("LM command is empty"))?;
        let resolved = which::which(program).map_err(|_| ProofreadError::ToolNotFound {
            program: program.clone(),
        })?;
        Command::new(&resolved)
            .args(args)
            .args([
                "--print",
                "--model",
                self.config.model.as_str(),
                "--output-format",
                "text",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .with_context(|| format!("spawn LM command: {}", resolved.display()))
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            if !active.cancelled {
                let _ = state::terminate_group(active.pid, libc::SIGKILL);
            }
            let _ = state::remove_marker_for(&self.config.state_dir, active.pid);
        }
    }
}

/// Publish `marker`, or fail with `AlreadyRunning` if another live run holds
/// the slot. A stale marker found on the way is cleared and the claim retried.
fn claim_marker(state_dir: &Path, marker: &RunMarker) -> Result<()> {
    for _ in 0..3 {
        if state::create_marker(state_dir, marker)? {
            return Ok(());
        }
        if let Some(holder) = state::load_live_marker(state_dir)? {
            return Err(ProofreadError::AlreadyRunning {
                source_ref: holder.source_ref,
                pid: holder.child_pid,
            }
            .into());
        }
    }
    Err(anyhow!(
        "could not claim run marker in {}",
        state_dir.display()
    ))
}

/// Feed stdin, drain stderr and watch stdout on separate threads so a chatty
/// child can never block on a full pipe.
fn spawn_io_threads(mut child: Child, prompt: Vec<u8>) -> Result<Receiver<RunExit>> {
    let mut stdin = child.stdin.take().context("LM stdin not captured")?;
    let mut stdout = child.stdout.take().context("LM stdout not captured")?;
    let mut stderr = child.stderr.take().context("LM stderr not captured")?;

    thread::spawn(move || {
        // Dropping stdin at the end of this closure signals end-of-input.
        if let Err(err) = stdin.write_all(&prompt) {
            tracing::warn!(%err, "write prompt to LM stdin");
        }
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    });

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = stdout.read_to_end(&mut buf) {
            tracing::warn!(%err, "read LM stdout");
        }
        let status = child.wait();
        let stderr = stderr_reader.join().unwrap_or_default();
        let _ = tx.send(RunExit {
            status,
            stdout: buf,
            stderr,
        });
    });
    Ok(rx)
}

fn describe_status(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(signal)) => format!("terminated by signal {signal}"),
        (None, None) => format!("ended with {status}"),
    }
}
