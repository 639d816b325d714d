//! Error kinds surfaced to the operator.
//!
//! Everything else travels as `anyhow::Error`; these variants sit at the root
//! of the chain so callers can `downcast_ref` and react to a specific kind.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProofreadError {
    #[error("a proofreading request is already running for {source_ref} (pid {pid})")]
    AlreadyRunning { source_ref: String, pid: u32 },

    #[error("LM output did not contain a balanced JSON array")]
    ExtractionFailed { raw_output: String },

    #[error("LM command {event}")]
    ProcessFailure {
        event: String,
        raw_output: String,
        stderr: String,
    },

    #[error("no corrections file at {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("parse corrections file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("prompt template is missing the {placeholder} placeholder")]
    TemplateMissingPlaceholder { placeholder: &'static str },

    #[error("LM command not found: {program}")]
    ToolNotFound { program: String },

    #[error("line range {start}-{end} selects no text")]
    EmptyRange { start: usize, end: usize },
}

impl ProofreadError {
    /// Raw LM output attached to failures that leave something to inspect.
    pub fn raw_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::ExtractionFailed { raw_output } => Some((raw_output.as_str(), "")),
            Self::ProcessFailure {
                raw_output, stderr, ..
            } => Some((raw_output.as_str(), stderr.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_output_only_for_run_failures() {
        let err = ProofreadError::ExtractionFailed {
            raw_output: "sorry".to_string(),
        };
        assert_eq!(err.raw_output(), Some(("sorry", "")));

        let err = ProofreadError::FileNotFound {
            path: PathBuf::from("replacements.json"),
        };
        assert!(err.raw_output().is_none());
        assert_eq!(err.to_string(), "no corrections file at replacements.json");
    }
}
