use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for a conversion job.
///
/// Every variant renders as the single diagnostic line shown to the user
/// before the process exits with a failure status. Expected failures never
/// surface a backtrace.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Cannot create output directory {}: {source}", .path.display())]
    OutputUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse book: {0}")]
    Parse(String),

    #[error("Failed to prepare processing file: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("Failed to start synthesis backend: {0}")]
    EngineStartup(String),

    /// The engine reported completion with an empty output path.
    #[error("Conversion failed.")]
    EngineFailure,

    #[error("Interrupted by user.")]
    Cancelled,

    /// Unexpected internal error (illegal state transition, poisoned lock).
    #[error("Error: {0}")]
    Internal(String),
}
