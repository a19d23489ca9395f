//! Log flush error types.
//!
//! Error codes:
//! - AERO_LOG_APPEND_FAILED (ERROR severity)
//! - AERO_LOG_FSYNC_FAILED (FATAL severity)
//! - AERO_LOG_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for flush errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
    /// Durability can no longer be trusted; the host must terminate
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Flush-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushErrorCode {
    /// Buffered append or file write failed
    AeroLogAppendFailed,
    /// fsync failed; the durable LSN cannot advance
    AeroLogFsyncFailed,
    /// Record framing or checksum failure during verification
    AeroLogCorruption,
}

impl FlushErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            FlushErrorCode::AeroLogAppendFailed => "AERO_LOG_APPEND_FAILED",
            FlushErrorCode::AeroLogFsyncFailed => "AERO_LOG_FSYNC_FAILED",
            FlushErrorCode::AeroLogCorruption => "AERO_LOG_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            FlushErrorCode::AeroLogAppendFailed => Severity::Error,
            FlushErrorCode::AeroLogFsyncFailed => Severity::Fatal,
            FlushErrorCode::AeroLogCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for FlushErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Flush error with context.
#[derive(Debug)]
pub struct FlushError {
    code: FlushErrorCode,
    message: String,
    /// Optional position context (byte offset into the log)
    offset: Option<u64>,
    source: Option<io::Error>,
}

impl FlushError {
    /// Create an append failure
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: FlushErrorCode::AeroLogAppendFailed,
            message: message.into(),
            offset: None,
            source: Some(source),
        }
    }

    /// Create an fsync failure
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: FlushErrorCode::AeroLogFsyncFailed,
            message: message.into(),
            offset: None,
            source: Some(source),
        }
    }

    /// Create a corruption error at a byte offset
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: FlushErrorCode::AeroLogCorruption,
            message: reason.into(),
            offset: Some(offset),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> FlushErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(offset) = self.offset {
            write!(f, " (byte_offset: {})", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for flush operations
pub type FlushResult<T> = Result<T, FlushError>;
