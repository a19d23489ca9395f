//! Group commit lock: leadership arbitration for log flushing.
//!
//! Many committing threads need the durable LSN to reach the end of their own
//! record. Instead of each thread flushing, exactly one thread at a time (the
//! leader) performs the physical flush on behalf of every thread whose target
//! falls below the point the flush will reach.
//!
//! Contract:
//! - `acquire` answers "is my target durable yet, and if not, am I the one
//!   who must flush?" A caller that receives [`AcquireResult::Acquired`] owns
//!   the obligation to flush and then call `release` with the durable LSN.
//! - The flush itself happens strictly between `acquire` returning `Acquired`
//!   and the matching `release` call, outside any lock held here.
//! - Completion callbacks run exactly once, never while the internal mutex is
//!   held, and must not re-enter this lock synchronously.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::semaphore::BinarySemaphore;
use super::stats::SyncMetrics;

/// Log sequence number: a monotonically non-decreasing durability counter.
/// Only ordering is meaningful here; no arithmetic is performed on it.
pub type Lsn = u64;

/// Completion callback for asynchronous commit notification. Invoked exactly
/// once when the durable LSN reaches the registered target.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Number of ready callbacks `release` collects before the buffer spills.
/// A spill grows the buffer; it never fails and never drops a callback.
const CALLBACK_FAST_PATH: usize = 8;

/// Terminal outcomes of [`GroupCommitLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// The caller is now the leader. It must perform the flush and then call
    /// [`GroupCommitLock::release`] with the durable LSN.
    Acquired,
    /// The target was already durable. Any supplied callback has been invoked
    /// synchronously before returning.
    Expired,
    /// A callback was supplied while another leader held the lock; it will be
    /// invoked by a later `release`. The caller must not flush.
    CallbackQueued,
}

/// Per-thread wait slot. Reused across acquire calls via thread-local
/// storage so the blocking path allocates only on a thread's first wait.
struct WaiterSlot {
    /// LSN this thread is waiting for. Written before the slot is enqueued
    /// (under the lock's mutex), read during release (same mutex).
    target: AtomicU64,
    /// Set by a releaser to draft this thread as the next leader. Ordering
    /// rides on the semaphore wake; relaxed accesses are sufficient because
    /// the flag is only set while the slot is enqueued and only read by its
    /// owning thread after the matching wake.
    become_leader: AtomicBool,
    sema: BinarySemaphore,
}

impl WaiterSlot {
    fn new() -> Self {
        Self {
            target: AtomicU64::new(0),
            become_leader: AtomicBool::new(false),
            sema: BinarySemaphore::new(),
        }
    }
}

thread_local! {
    static WAITER_SLOT: Arc<WaiterSlot> = Arc::new(WaiterSlot::new());
}

/// An asynchronous notification request parked behind an active leader.
struct PendingCallback {
    target: Lsn,
    callback: CompletionCallback,
}

/// State guarded by the internal mutex.
struct Inner {
    /// True while some thread is the designated leader.
    locked: bool,
    /// Thread currently holding leadership, for contract checking.
    #[cfg(debug_assertions)]
    owner: Option<std::thread::ThreadId>,
    /// Threads blocked until their target becomes durable, oldest first.
    waiters: VecDeque<Arc<WaiterSlot>>,
    /// Callbacks waiting for a future release to satisfy them.
    pending: Vec<PendingCallback>,
}

/// The group commit coordinator.
///
/// Tracks the durable LSN, elects one flush leader at a time, parks
/// synchronous waiters, and dispatches asynchronous completion callbacks.
pub struct GroupCommitLock {
    /// Durable LSN. Read lock-free by [`GroupCommitLock::value`]; a stale
    /// read is acceptable because every decision path re-checks under the
    /// mutex before concluding "not durable yet".
    value: AtomicU64,
    inner: Mutex<Inner>,
    metrics: SyncMetrics,
}

impl GroupCommitLock {
    /// Creates a lock with the durable LSN at `initial`.
    pub fn new(initial: Lsn) -> Self {
        Self {
            value: AtomicU64::new(initial),
            inner: Mutex::new(Inner {
                locked: false,
                #[cfg(debug_assertions)]
                owner: None,
                waiters: VecDeque::new(),
                pending: Vec::new(),
            }),
            metrics: SyncMetrics::new(),
        }
    }

    /// Current durable LSN. Lock-free, possibly momentarily stale.
    pub fn value(&self) -> Lsn {
        self.value.load(Ordering::Relaxed)
    }

    /// Contention counters for this lock.
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Requests durability up to `target`.
    ///
    /// With `callback == None` the call blocks until either the target is
    /// durable (`Expired`) or the caller is elected leader (`Acquired`).
    /// With a callback the call never blocks: the callback runs inline if the
    /// target is already durable, otherwise it is queued (`CallbackQueued`)
    /// unless the lock is free, in which case the caller becomes leader and
    /// the callback fires during its own `release`.
    pub fn acquire(&self, target: Lsn, callback: Option<CompletionCallback>) -> AcquireResult {
        WAITER_SLOT.with(|slot| self.acquire_with_slot(target, callback, slot))
    }

    fn acquire_with_slot(
        &self,
        target: Lsn,
        mut callback: Option<CompletionCallback>,
        slot: &Arc<WaiterSlot>,
    ) -> AcquireResult {
        // Fast check without the mutex. A thread that is not enqueued cannot
        // have its leader flag set, so a satisfied target settles it.
        if target <= self.value() && !slot.become_leader.load(Ordering::Relaxed) {
            self.metrics.increment_expired();
            if let Some(cb) = callback.take() {
                cb();
            }
            return AcquireResult::Expired;
        }

        let mut parks: u64 = 0;
        loop {
            let mut inner = self.inner.lock().unwrap();

            // Re-check under the mutex. A drafted leader must not bail out
            // here even if its own target is durable: leadership was handed
            // to it precisely so the remaining queue gets served.
            if target <= self.value() && !slot.become_leader.load(Ordering::Relaxed) {
                drop(inner);
                self.metrics.increment_expired();
                if let Some(cb) = callback.take() {
                    cb();
                }
                return AcquireResult::Expired;
            }

            if !inner.locked {
                inner.locked = true;
                #[cfg(debug_assertions)]
                {
                    inner.owner = Some(std::thread::current().id());
                }
                slot.become_leader.store(false, Ordering::Relaxed);
                if let Some(cb) = callback.take() {
                    // The leader's own callback queues like everyone else's
                    // and fires during its release.
                    inner.pending.push(PendingCallback {
                        target,
                        callback: cb,
                    });
                }
                drop(inner);
                self.metrics.increment_leaders_granted();
                return AcquireResult::Acquired;
            }

            if let Some(cb) = callback.take() {
                inner.pending.push(PendingCallback {
                    target,
                    callback: cb,
                });
                drop(inner);
                self.metrics.increment_callbacks_queued();
                return AcquireResult::CallbackQueued;
            }

            // Synchronous path: enqueue and park until a releaser wakes us.
            slot.target.store(target, Ordering::Relaxed);
            inner.waiters.push_back(Arc::clone(slot));
            drop(inner);

            if parks > 0 {
                self.metrics.increment_spurious_wakeups();
            }
            parks += 1;
            self.metrics.increment_parked_waits();
            slot.sema.wait();
        }
    }

    /// Publishes `new_value` as durable and hands the lock off.
    ///
    /// Wakes every waiter whose target is now satisfied, invokes every
    /// satisfied callback (outside the mutex), and, if unsatisfied waiters or
    /// callbacks remain, drafts exactly one thread as the next leader and
    /// wakes it first.
    ///
    /// Only the current leader may call this, and `new_value` must not
    /// regress below the current durable LSN; both are contract violations
    /// checked in debug builds.
    ///
    /// # Returns
    ///
    /// `0` normally. If callbacks remain unsatisfied and there is no thread
    /// to draft as leader, returns the smallest unsatisfied target: the
    /// caller must arrange another flush pass or those callbacks stall.
    pub fn release(&self, new_value: Lsn) -> Lsn {
        let mut ready: Vec<CompletionCallback> = Vec::with_capacity(CALLBACK_FAST_PATH);
        let mut wakeup: Vec<Arc<WaiterSlot>> = Vec::new();
        let mut leader: Option<Arc<WaiterSlot>> = None;
        let mut stall_target: Lsn = 0;

        {
            let mut inner = self.inner.lock().unwrap();
            debug_assert!(inner.locked, "release without a leader");
            #[cfg(debug_assertions)]
            {
                debug_assert_eq!(
                    inner.owner,
                    Some(std::thread::current().id()),
                    "release from a thread that is not the leader"
                );
                inner.owner = None;
            }
            debug_assert!(
                new_value >= self.value(),
                "durable LSN must not regress: {} < {}",
                new_value,
                self.value()
            );

            self.value.store(new_value, Ordering::Relaxed);

            // Satisfied callbacks are collected and invoked after unlock.
            let mut keep = Vec::new();
            for pending in std::mem::take(&mut inner.pending) {
                if pending.target <= new_value {
                    ready.push(pending.callback);
                } else {
                    keep.push(pending);
                }
            }
            inner.pending = keep;

            // Move satisfied waiters onto the wakeup list, preserving queue
            // order for the rest.
            for _ in 0..inner.waiters.len() {
                let slot = inner.waiters.pop_front().unwrap();
                if slot.target.load(Ordering::Relaxed) <= new_value {
                    wakeup.push(slot);
                } else {
                    inner.waiters.push_back(slot);
                }
            }

            // Unsatisfied work left behind needs a thread to drive the next
            // flush. Draft the oldest remaining waiter; failing that, one of
            // the threads being woken anyway; failing that, tell the caller.
            if !inner.pending.is_empty() || !inner.waiters.is_empty() {
                if let Some(slot) = inner.waiters.pop_front() {
                    slot.become_leader.store(true, Ordering::Relaxed);
                    leader = Some(slot);
                    self.metrics.increment_leader_promotions();
                } else if let Some(slot) = wakeup.pop() {
                    slot.become_leader.store(true, Ordering::Relaxed);
                    leader = Some(slot);
                    self.metrics.increment_leader_promotions();
                } else {
                    // Only queued callbacks remain and nobody can be woken to
                    // service them.
                    stall_target = inner
                        .pending
                        .iter()
                        .map(|p| p.target)
                        .min()
                        .unwrap_or(0);
                    self.metrics.increment_stall_signals();
                }
            }

            inner.locked = false;
        }

        // The drafted leader is woken before anything else so that it, not a
        // crowd of spuriously woken waiters, reaches the free lock first.
        if let Some(slot) = leader {
            slot.sema.wake();
        }

        self.metrics.add_callbacks_fired(ready.len() as u64);
        for callback in ready {
            callback();
        }

        for slot in wakeup {
            slot.sema.wake();
        }

        self.metrics.increment_releases();
        stall_target
    }
}

impl std::fmt::Debug for GroupCommitLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCommitLock")
            .field("value", &self.value())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> CompletionCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    // ==================== Single-thread contract ====================

    #[test]
    fn test_fresh_lock_grants_leadership() {
        let lock = GroupCommitLock::new(0);
        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        assert_eq!(lock.release(10), 0);
        assert_eq!(lock.value(), 10);
    }

    #[test]
    fn test_satisfied_target_expires_without_leadership() {
        let lock = GroupCommitLock::new(0);
        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        assert_eq!(lock.release(10), 0);

        assert_eq!(lock.acquire(5, None), AcquireResult::Expired);
        assert_eq!(lock.acquire(10, None), AcquireResult::Expired);
        assert_eq!(lock.value(), 10);
    }

    #[test]
    fn test_release_never_regresses_value() {
        let lock = GroupCommitLock::new(0);
        assert_eq!(lock.acquire(5, None), AcquireResult::Acquired);
        lock.release(5);
        assert_eq!(lock.acquire(9, None), AcquireResult::Acquired);
        lock.release(9);
        assert_eq!(lock.value(), 9);
    }

    #[test]
    fn test_release_at_current_value_is_allowed() {
        let lock = GroupCommitLock::new(7);
        assert_eq!(lock.acquire(9, None), AcquireResult::Acquired);
        // A flush pass that made no progress publishes the same LSN.
        assert_eq!(lock.release(7), 0);
        assert_eq!(lock.value(), 7);
    }

    // ==================== Callbacks ====================

    #[test]
    fn test_expired_callback_runs_inline() {
        let lock = GroupCommitLock::new(10);
        let fired = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            lock.acquire(5, Some(counting_callback(&fired))),
            AcquireResult::Expired
        );
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_leader_callback_fires_during_own_release() {
        let lock = GroupCommitLock::new(0);
        let fired = Arc::new(AtomicUsize::new(0));

        assert_eq!(
            lock.acquire(5, Some(counting_callback(&fired))),
            AcquireResult::Acquired
        );
        // Not yet: the flush has not happened.
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert_eq!(lock.release(5), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_queued_behind_active_leader() {
        let lock = GroupCommitLock::new(0);
        let fired = Arc::new(AtomicUsize::new(0));

        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        assert_eq!(
            lock.acquire(5, Some(counting_callback(&fired))),
            AcquireResult::CallbackQueued
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert_eq!(lock.release(7), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsatisfied_callback_survives_release() {
        let lock = GroupCommitLock::new(0);
        let fired = Arc::new(AtomicUsize::new(0));

        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        assert_eq!(
            lock.acquire(20, Some(counting_callback(&fired))),
            AcquireResult::CallbackQueued
        );

        // 20 is not reached and nobody is parked: the caller is told to
        // arrange another flush pass.
        assert_eq!(lock.release(10), 20);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert_eq!(lock.acquire(20, None), AcquireResult::Acquired);
        assert_eq!(lock.release(20), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_overflow_beyond_fast_path() {
        let lock = GroupCommitLock::new(0);
        let fired = Arc::new(AtomicUsize::new(0));

        assert_eq!(lock.acquire(100, None), AcquireResult::Acquired);
        let queued = CALLBACK_FAST_PATH * 3;
        for i in 0..queued {
            assert_eq!(
                lock.acquire(1 + i as Lsn, Some(counting_callback(&fired))),
                AcquireResult::CallbackQueued
            );
        }

        assert_eq!(lock.release(100), 0);
        assert_eq!(fired.load(Ordering::SeqCst), queued);
    }

    // ==================== Cross-thread behavior ====================

    #[test]
    fn test_blocked_waiter_wakes_when_satisfied() {
        let lock = Arc::new(GroupCommitLock::new(0));
        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire(5, None))
        };
        // Let the waiter park behind the active leader.
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        assert_eq!(lock.release(7), 0);
        assert_eq!(waiter.join().unwrap(), AcquireResult::Expired);
        assert_eq!(lock.value(), 7);
    }

    #[test]
    fn test_unsatisfied_waiter_is_promoted_to_leader() {
        let lock = Arc::new(GroupCommitLock::new(0));
        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let result = lock.acquire(20, None);
                if result == AcquireResult::Acquired {
                    lock.release(20);
                }
                result
            })
        };
        thread::sleep(Duration::from_millis(50));

        // 20 > 15: the waiter cannot be satisfied, so it must inherit
        // leadership and flush for itself.
        assert_eq!(lock.release(15), 0);
        assert_eq!(waiter.join().unwrap(), AcquireResult::Acquired);
        assert_eq!(lock.value(), 20);
    }

    #[test]
    fn test_promoted_leader_serves_queued_callbacks() {
        let lock = Arc::new(GroupCommitLock::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        assert_eq!(
            lock.acquire(30, Some(counting_callback(&fired))),
            AcquireResult::CallbackQueued
        );

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                // Satisfied by release(15), but drafted as leader anyway so
                // the queued callback at 30 gets a flush pass.
                let result = lock.acquire(12, None);
                if result == AcquireResult::Acquired {
                    lock.release(30);
                }
                result
            })
        };
        thread::sleep(Duration::from_millis(50));

        lock.release(15);
        assert_eq!(waiter.join().unwrap(), AcquireResult::Acquired);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(lock.value(), 30);
    }

    #[test]
    fn test_slot_reuse_across_sequential_acquires() {
        let lock = Arc::new(GroupCommitLock::new(0));

        // The same OS thread parks, wakes, and parks again many times; its
        // thread-local slot must come back clean every cycle.
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                for round in 1..=50u64 {
                    match lock.acquire(round * 10, None) {
                        AcquireResult::Acquired => {
                            lock.release(round * 10);
                        }
                        AcquireResult::Expired => {}
                        AcquireResult::CallbackQueued => unreachable!(),
                    }
                }
            })
        };

        let driver = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                for round in 1..=50u64 {
                    if lock.acquire(round * 10, None) == AcquireResult::Acquired {
                        lock.release(round * 10);
                    }
                }
            })
        };

        waiter.join().unwrap();
        driver.join().unwrap();
        assert_eq!(lock.value(), 500);
    }

    #[test]
    fn test_metrics_track_leader_grants_and_releases() {
        let lock = GroupCommitLock::new(0);
        assert_eq!(lock.acquire(10, None), AcquireResult::Acquired);
        lock.release(10);
        assert_eq!(lock.acquire(5, None), AcquireResult::Expired);

        let snapshot = lock.metrics().snapshot();
        assert_eq!(snapshot.leaders_granted, 1);
        assert_eq!(snapshot.releases, 1);
        assert_eq!(snapshot.expired, 1);
    }
}
