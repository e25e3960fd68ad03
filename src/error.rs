//! Error taxonomy for the orchestrator
//!
//! Only `StoreCorrupt` and `ConfigInvalid` are fatal to a run. Failures of the
//! external collaborators are absorbed by the phase executor and surface as a
//! failed phase, never as a `PipelineError`.

use std::path::PathBuf;

/// Result type for orchestrator operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Process-level errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("State file '{path}' is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to persist state file '{path}': {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Exit code reported by the binary for a fatal error
    pub fn exit_code(&self) -> i32 {
        3
    }
}

/// Errors reported by an external collaborator for a single attempt
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Command '{program}' could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{program}' exited with code {code:?}: {stderr}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Expected output not found: {0}")]
    MissingOutput(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid artifact pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    /// A permanent error means another attempt would see the same result.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CollaboratorError::ValidationFailed(_))
    }
}
