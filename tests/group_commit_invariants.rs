//! Group Commit Lock Invariant Tests
//!
//! Tests for invariants:
//! - Monotonicity: the durable LSN never decreases, under any interleaving
//! - At-most-one-leader: no two threads hold leadership at the same instant
//! - Callback-exactly-once: every registered callback fires exactly once
//!
//! These invariants are mandatory and must hold under full contention, so
//! every test here runs many threads against one lock.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use aerosync::sync::{AcquireResult, GroupCommitLock, Lsn};

// =============================================================================
// Test Utilities
// =============================================================================

/// Simulated log device: `reserved` grows as committers claim LSNs; a leader
/// "flushes" by publishing the reserved watermark it observed.
struct SimulatedLog {
    lock: GroupCommitLock,
    reserved: AtomicU64,
}

impl SimulatedLog {
    fn new() -> Self {
        Self {
            lock: GroupCommitLock::new(0),
            reserved: AtomicU64::new(0),
        }
    }

    fn reserve(&self) -> Lsn {
        self.reserved.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Blocking commit of one record, becoming leader when elected. Keeps
    /// flushing while release reports stalled callbacks.
    fn commit(&self, target: Lsn, flush: impl Fn()) {
        let mut want = target;
        loop {
            match self.lock.acquire(want, None) {
                AcquireResult::Expired => {
                    if self.lock.value() >= target {
                        return;
                    }
                    want = target;
                }
                AcquireResult::Acquired => {
                    flush();
                    let watermark = self.reserved.load(Ordering::SeqCst);
                    let stalled = self.lock.release(watermark);
                    if stalled != 0 {
                        want = stalled;
                    } else if self.lock.value() >= target {
                        return;
                    } else {
                        want = target;
                    }
                }
                AcquireResult::CallbackQueued => unreachable!(),
            }
        }
    }

    /// Drives flush passes until nothing satisfiable remains queued.
    fn drain(&self) {
        let watermark = self.reserved.load(Ordering::SeqCst);
        self.commit(watermark, || {});
    }
}

// =============================================================================
// INVARIANT: Monotonicity
// =============================================================================

/// The durable LSN observed from an independent thread must never decrease,
/// no matter how releases interleave.
#[test]
fn test_value_never_decreases_under_contention() {
    let log = Arc::new(SimulatedLog::new());
    let stop = Arc::new(AtomicBool::new(false));
    let regressed = Arc::new(AtomicBool::new(false));

    let observer = {
        let log = Arc::clone(&log);
        let stop = Arc::clone(&stop);
        let regressed = Arc::clone(&regressed);
        thread::spawn(move || {
            let mut last = 0;
            while !stop.load(Ordering::Relaxed) {
                let now = log.lock.value();
                if now < last {
                    regressed.store(true, Ordering::Relaxed);
                    return;
                }
                last = now;
            }
        })
    };

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for _ in 0..500 {
                    let target = log.reserve();
                    log.commit(target, || {});
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    observer.join().unwrap();

    assert!(!regressed.load(Ordering::Relaxed), "durable LSN regressed");
    assert_eq!(log.lock.value(), 8 * 500);
}

// =============================================================================
// INVARIANT: At Most One Leader
// =============================================================================

/// Between acquire() returning Acquired and the matching release(), no other
/// thread may be granted leadership.
#[test]
fn test_at_most_one_leader_at_any_instant() {
    let lock = Arc::new(GroupCommitLock::new(0));
    let reserved = Arc::new(AtomicU64::new(0));
    let leaders_inside = Arc::new(AtomicI64::new(0));
    let overlap_seen = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let reserved = Arc::clone(&reserved);
            let leaders_inside = Arc::clone(&leaders_inside);
            let overlap_seen = Arc::clone(&overlap_seen);
            thread::spawn(move || {
                for _ in 0..300 {
                    let target = reserved.fetch_add(1, Ordering::SeqCst) + 1;
                    loop {
                        match lock.acquire(target, None) {
                            AcquireResult::Expired => break,
                            AcquireResult::Acquired => {
                                if leaders_inside.fetch_add(1, Ordering::SeqCst) != 0 {
                                    overlap_seen.store(true, Ordering::SeqCst);
                                }
                                // The "flush": long enough for a second
                                // would-be leader to collide if one existed.
                                std::hint::black_box(&lock);
                                let watermark = reserved.load(Ordering::SeqCst);
                                leaders_inside.fetch_sub(1, Ordering::SeqCst);
                                lock.release(watermark);
                                if lock.value() >= target {
                                    break;
                                }
                            }
                            AcquireResult::CallbackQueued => unreachable!(),
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(
        !overlap_seen.load(Ordering::SeqCst),
        "two threads held leadership concurrently"
    );
}

// =============================================================================
// INVARIANT: Callback Exactly Once
// =============================================================================

/// Every callback registered through acquire() fires exactly once, whether it
/// ran inline (already satisfied), from the registering leader's release, or
/// from some later leader's release.
#[test]
fn test_every_callback_fires_exactly_once() {
    const THREADS: usize = 6;
    const PER_THREAD: usize = 200;

    let log = Arc::new(SimulatedLog::new());
    let cells: Arc<Vec<AtomicUsize>> = Arc::new(
        (0..THREADS * PER_THREAD)
            .map(|_| AtomicUsize::new(0))
            .collect(),
    );

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let log = Arc::clone(&log);
            let cells = Arc::clone(&cells);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let target = log.reserve();
                    let index = t * PER_THREAD + i;
                    let cells = Arc::clone(&cells);
                    let result = log.lock.acquire(
                        target,
                        Some(Box::new(move || {
                            cells[index].fetch_add(1, Ordering::SeqCst);
                        })),
                    );
                    if result == AcquireResult::Acquired {
                        let watermark = log.reserved.load(Ordering::SeqCst);
                        log.lock.release(watermark);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    log.drain();

    let fired: Vec<usize> = cells.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert!(
        fired.iter().all(|&count| count == 1),
        "some callback fired {:?} times",
        fired.iter().find(|&&count| count != 1)
    );
}
