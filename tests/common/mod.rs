//! Shared test infrastructure for CLI integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Scratch directory with isolated config/state and a mock LM script.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(dir.path().join("xdg-config")).expect("create config dir");
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path("state")
    }

    pub fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.path(rel);
        fs::write(&path, body).expect("write fixture file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read workspace file")
    }

    /// Install a mock LM whose shell body runs with the prompt on stdin.
    ///
    /// Returns the `--command` value that invokes it.
    pub fn mock_lm(&self, body: &str) -> String {
        let script = self.write("mock-lm.sh", body);
        format!("sh '{}'", script.display())
    }

    /// A `proofread` command isolated from the user's config and state.
    pub fn proofread(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_proofread"));
        command
            .current_dir(self.dir.path())
            .env("XDG_CONFIG_HOME", self.path("xdg-config"))
            .env("PROOFREAD_STATE_DIR", self.state_dir())
            .env_remove("PROOFREAD_COMMAND")
            .env_remove("PROOFREAD_MODEL")
            .env_remove("PROOFREAD_OUTPUT_FILE")
            .env_remove("PROOFREAD_LOG");
        command
    }

    /// Wait until `path` exists, up to a few seconds.
    pub fn wait_for(&self, path: &Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
