//! Observability for the group commit core.
//!
//! # Principles
//!
//! 1. Observability is read-only; no side effects on synchronization
//! 2. No async or background threads
//! 3. Deterministic output
//!
//! Contention metrics live with the lock itself
//! ([`crate::sync::SyncMetrics`]); this module carries the structured
//! logger.

mod logger;

pub use logger::{LogSeverity, Logger};
