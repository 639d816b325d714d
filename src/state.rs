//! Run marker shared between `proofread` invocations.
//!
//! Each CLI command is its own OS process, so the single active-run slot is
//! mirrored on disk. The marker is created exclusively, so of two racing sends
//! only one claims it. It names the LM process group; a marker whose group is
//! gone is stale and does not block a new send.
use crate::store::write_atomic;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const MARKER_FILE: &str = "active-run.json";
const LAST_OUTPUT_FILE: &str = "last-output.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    /// LM subprocess pid.
    pub child_pid: u32,
    /// Process group led by the LM subprocess; the target of `cancel`.
    pub process_group: u32,
    /// The `proofread` process waiting on the child.
    pub owner_pid: u32,
    pub source_ref: String,
    pub output_path: PathBuf,
    pub started_at_epoch_ms: u128,
}

pub fn marker_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MARKER_FILE)
}

/// Load the marker if present and its LM is still alive.
///
/// A stale or unreadable marker is removed as a side effect.
pub fn load_live_marker(state_dir: &Path) -> Result<Option<RunMarker>> {
    let path = marker_path(state_dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let marker: RunMarker = match serde_json::from_slice(&bytes) {
        Ok(marker) => marker,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "discarding unreadable run marker");
            if fs::read(&path).ok().as_deref() == Some(bytes.as_slice()) {
                remove_marker(state_dir)?;
            }
            return Ok(None);
        }
    };
    if !pid_alive(marker.child_pid) && !group_alive(marker.process_group) {
        tracing::warn!(
            pid = marker.child_pid,
            source = %marker.source_ref,
            "discarding stale run marker"
        );
        remove_marker_for(state_dir, marker.child_pid)?;
        return Ok(None);
    }
    Ok(Some(marker))
}

/// Claim the marker slot. Returns false when a marker already exists.
///
/// The content is staged in a temp file and linked into place without
/// clobbering, so readers never observe a partially written marker.
pub fn create_marker(state_dir: &Path, marker: &RunMarker) -> Result<bool> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("create {}", state_dir.display()))?;
    let bytes = serde_json::to_vec_pretty(marker).context("serialize run marker")?;
    let mut tmp = tempfile::NamedTempFile::new_in(state_dir)
        .with_context(|| format!("create temp file in {}", state_dir.display()))?;
    tmp.write_all(&bytes).context("write run marker")?;
    let path = marker_path(state_dir);
    match tmp.persist_noclobber(&path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(anyhow!("publish {}: {}", path.display(), err.error)),
    }
}

/// Remove the marker only if it still belongs to the run with `child_pid`.
pub fn remove_marker_for(state_dir: &Path, child_pid: u32) -> Result<()> {
    let path = marker_path(state_dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    match serde_json::from_slice::<RunMarker>(&bytes) {
        Ok(marker) if marker.child_pid == child_pid => remove_marker(state_dir),
        Ok(marker) => {
            tracing::debug!(
                ours = child_pid,
                theirs = marker.child_pid,
                "run marker belongs to another run; leaving it"
            );
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn remove_marker(state_dir: &Path) -> Result<()> {
    let path = marker_path(state_dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// Keep the raw LM output of a failed run for manual inspection.
pub fn save_last_output(state_dir: &Path, stdout: &str, stderr: &str) -> Result<PathBuf> {
    let path = state_dir.join(LAST_OUTPUT_FILE);
    let mut body = String::with_capacity(stdout.len() + stderr.len() + 32);
    body.push_str(stdout);
    if !stderr.is_empty() {
        body.push_str("\n--- stderr ---\n");
        body.push_str(stderr);
    }
    write_atomic(&path, body.as_bytes())?;
    Ok(path)
}

/// Signal 0 delivers nothing; it only checks the pid exists.
pub fn pid_alive(pid: u32) -> bool {
    match libc::pid_t::try_from(pid) {
        Ok(pid) if pid > 0 => exists(pid),
        _ => false,
    }
}

/// Whether any process is left in the group led by `pgid`.
pub fn group_alive(pgid: u32) -> bool {
    match libc::pid_t::try_from(pgid) {
        Ok(pgid) if pgid > 1 => exists(-pgid),
        _ => false,
    }
}

/// Deliver `signal` to every process in the group led by `pgid`.
pub fn terminate_group(pgid: u32, signal: libc::c_int) -> Result<()> {
    let target = match libc::pid_t::try_from(pgid) {
        Ok(pgid) if pgid > 1 => -pgid,
        _ => return Err(anyhow!("invalid process group {pgid}")),
    };
    kill(target, signal).with_context(|| format!("send signal {signal} to process group {pgid}"))
}

fn exists(target: libc::pid_t) -> bool {
    match kill(target, 0) {
        Ok(()) => true,
        Err(err) => err.raw_os_error() == Some(libc::EPERM),
    }
}

/// `kill(2)`: a positive target is a pid, a negative one a process group.
fn kill(target: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: kill takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}
