//! Structured JSON logger.
//!
//! - One log line = one event
//! - Deterministic key ordering (event, severity, then fields sorted by key)
//! - Synchronous, unbuffered
//! - ERROR and FATAL go to stderr, everything else to stdout
//! - A process-wide minimum severity gates emission; TRACE is off by default

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-operation detail (flush sizes, wakeup counts)
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl LogSeverity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Info => "INFO",
            LogSeverity::Warn => "WARN",
            LogSeverity::Error => "ERROR",
            LogSeverity::Fatal => "FATAL",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Info,
            2 => LogSeverity::Warn,
            3 => LogSeverity::Error,
            _ => LogSeverity::Fatal,
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimum severity emitted. Defaults to INFO.
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Info as u8);

/// Structured logger emitting one JSON object per line.
pub struct Logger;

impl Logger {
    /// Sets the process-wide minimum severity.
    pub fn set_min_severity(severity: LogSeverity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    /// Returns the current minimum severity.
    pub fn min_severity() -> LogSeverity {
        LogSeverity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Logs an event with the given severity and fields.
    pub fn log(severity: LogSeverity, event: &str, fields: &[(&str, &str)]) {
        if severity < Self::min_severity() {
            return;
        }
        if severity >= LogSeverity::Error {
            Self::emit(severity, event, fields, &mut io::stderr());
        } else {
            Self::emit(severity, event, fields, &mut io::stdout());
        }
    }

    /// Formats and writes one log line. Write failures are swallowed;
    /// logging must never take the process down.
    fn emit<W: Write>(severity: LogSeverity, event: &str, fields: &[(&str, &str)], writer: &mut W) {
        let mut line = String::with_capacity(128);

        line.push_str("{\"event\":\"");
        escape_into(&mut line, event);
        line.push_str("\",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, value) in sorted {
            line.push_str(",\"");
            escape_into(&mut line, key);
            line.push_str("\":\"");
            escape_into(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");

        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(LogSeverity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(LogSeverity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(LogSeverity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(LogSeverity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(LogSeverity::Fatal, event, fields);
    }
}

/// Escapes `s` into `out` as JSON string content.
fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
fn capture(severity: LogSeverity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::emit(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}
