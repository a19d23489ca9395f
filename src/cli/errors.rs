//! CLI error types.

use thiserror::Error;

use crate::flush::FlushError;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI errors. All of these terminate the process with a non-zero exit.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file missing, unreadable, or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure outside the log itself
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Log append, fsync, or verification failure
    #[error(transparent)]
    Flush(#[from] FlushError),

    /// A stress worker thread panicked
    #[error("Stress worker thread panicked")]
    WorkerPanicked,
}
