//! Contention counters for the group commit lock.
//!
//! Counters only, monotonic, reset only on construction. All increments use
//! relaxed atomics; exact cross-counter consistency is not needed for
//! diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counter registry tracking how commits move through the lock.
///
/// # Thread Safety
///
/// All counters are atomic and may be incremented from any thread without
/// holding the lock's internal mutex.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Acquires satisfied without waiting (target already durable)
    expired: AtomicU64,
    /// Acquires that granted leadership
    leaders_granted: AtomicU64,
    /// Asynchronous completion callbacks queued behind an active leader
    callbacks_queued: AtomicU64,
    /// Times a thread parked on its semaphore
    parked_waits: AtomicU64,
    /// Wakeups that re-parked because the target was still not durable
    spurious_wakeups: AtomicU64,
    /// Waiters promoted to leader during release
    leader_promotions: AtomicU64,
    /// Completion callbacks invoked
    callbacks_fired: AtomicU64,
    /// Release calls
    releases: AtomicU64,
    /// Releases that returned a stall target (pending callbacks, no leader)
    stall_signals: AtomicU64,
}

impl SyncMetrics {
    /// Creates a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_leaders_granted(&self) {
        self.leaders_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_callbacks_queued(&self) {
        self.callbacks_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_parked_waits(&self) {
        self.parked_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_spurious_wakeups(&self) {
        self.spurious_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_leader_promotions(&self) {
        self.leader_promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_callbacks_fired(&self, count: u64) {
        self.callbacks_fired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn increment_releases(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_stall_signals(&self) {
        self.stall_signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of release calls so far. One release corresponds to one
    /// completed flush by a leader.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Number of completion callbacks invoked so far.
    pub fn callbacks_fired(&self) -> u64 {
        self.callbacks_fired.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            expired: self.expired.load(Ordering::Relaxed),
            leaders_granted: self.leaders_granted.load(Ordering::Relaxed),
            callbacks_queued: self.callbacks_queued.load(Ordering::Relaxed),
            parked_waits: self.parked_waits.load(Ordering::Relaxed),
            spurious_wakeups: self.spurious_wakeups.load(Ordering::Relaxed),
            leader_promotions: self.leader_promotions.load(Ordering::Relaxed),
            callbacks_fired: self.callbacks_fired.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            stall_signals: self.stall_signals.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the lock's counters.
#[derive(Debug, Clone, Serialize)]
pub struct SyncMetricsSnapshot {
    pub expired: u64,
    pub leaders_granted: u64,
    pub callbacks_queued: u64,
    pub parked_waits: u64,
    pub spurious_wakeups: u64,
    pub leader_promotions: u64,
    pub callbacks_fired: u64,
    pub releases: u64,
    pub stall_signals: u64,
}
