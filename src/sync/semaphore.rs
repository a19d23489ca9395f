//! Binary semaphore (auto-reset event) used to park individual waiter threads.
//!
//! Semantics:
//! - At most one pending signal; redundant `wake()` calls coalesce
//! - `wait()` consumes the signal atomically on return
//! - A `wake()` that happens before `wait()` begins is never lost
//!
//! Two implementations share the same contract, selected by the `futex`
//! feature: a wait-on-address fast path built on the `atomic-wait` crate, and
//! a Mutex + Condvar fallback that is correct on any platform.
//!
//! A semaphore instance is owned by exactly one waiting thread. Other threads
//! only ever call `wake()` on it.

#[cfg(feature = "futex")]
mod imp {
    use std::sync::atomic::{AtomicU32, Ordering};

    use atomic_wait::{wait, wake_one};

    /// Futex-backed binary semaphore. The atomic word is 0 (unsignalled)
    /// or 1 (signalled).
    pub struct BinarySemaphore {
        signal: AtomicU32,
    }

    impl BinarySemaphore {
        /// Creates an unsignalled semaphore.
        pub const fn new() -> Self {
            Self {
                signal: AtomicU32::new(0),
            }
        }

        /// Blocks until the semaphore is signalled, then clears the signal.
        ///
        /// Must only be called by the owning waiter thread.
        pub fn wait(&self) {
            while self
                .signal
                .compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // Parks only while the word is still 0; a concurrent wake()
                // changes the word first, so the signal cannot be missed.
                wait(&self.signal, 0);
            }
        }

        /// Signals the semaphore and wakes the waiter if it was unsignalled.
        ///
        /// Callable from any thread. Idempotent while already signalled.
        pub fn wake(&self) {
            if self.signal.swap(1, Ordering::Release) == 0 {
                wake_one(&self.signal);
            }
        }
    }
}

#[cfg(not(feature = "futex"))]
mod imp {
    use std::sync::{Condvar, Mutex};

    /// Portable binary semaphore: a boolean flag guarded by a mutex, with a
    /// condition variable for the single blocked waiter.
    pub struct BinarySemaphore {
        signalled: Mutex<bool>,
        cond: Condvar,
    }

    impl BinarySemaphore {
        /// Creates an unsignalled semaphore.
        pub fn new() -> Self {
            Self {
                signalled: Mutex::new(false),
                cond: Condvar::new(),
            }
        }

        /// Blocks until the semaphore is signalled, then clears the signal.
        ///
        /// Must only be called by the owning waiter thread.
        pub fn wait(&self) {
            let mut signalled = self.signalled.lock().unwrap();
            while !*signalled {
                signalled = self.cond.wait(signalled).unwrap();
            }
            *signalled = false;
        }

        /// Signals the semaphore and wakes the waiter if it was unsignalled.
        ///
        /// Callable from any thread. Idempotent while already signalled.
        pub fn wake(&self) {
            let mut signalled = self.signalled.lock().unwrap();
            if !*signalled {
                *signalled = true;
                self.cond.notify_one();
            }
        }
    }
}

pub use imp::BinarySemaphore;

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}
