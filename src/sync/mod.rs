//! Group commit synchronization core.
//!
//! Two components:
//!
//! - [`BinarySemaphore`]: auto-reset wake primitive each blocked thread
//!   parks on
//! - [`GroupCommitLock`]: the coordinator that tracks the durable LSN,
//!   elects one flush leader at a time, and dispatches completion callbacks
//!
//! The expensive flush itself never happens inside this module; it belongs
//! to whoever holds leadership, strictly between `acquire` returning
//! [`AcquireResult::Acquired`] and the matching `release`.

mod group_commit;
mod semaphore;
mod stats;

pub use group_commit::{AcquireResult, CompletionCallback, GroupCommitLock, Lsn};
pub use semaphore::BinarySemaphore;
pub use stats::{SyncMetrics, SyncMetricsSnapshot};
