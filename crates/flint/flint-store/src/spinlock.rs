//! Inter-process spin lock, embeddable in shared memory.
//!
//! The parameter record is mutated from unrelated OS processes, so the
//! lock protecting it must live *inside* the shared region and must not
//! care at which virtual address each process mapped it. That rules out
//! anything with internal pointers or process-local state; what's left
//! is a word of atomic state and a spin loop.
//!
//! # Protocol
//!
//! **Acquire:**
//! 1. CAS the state word from `UNLOCKED` to `LOCKED` (Acquire)
//! 2. On failure, spin on plain loads until the word reads `UNLOCKED`,
//!    then retry the CAS
//!
//! **Release:**
//! 1. Store `UNLOCKED` (Release)
//!
//! # Why spinning is acceptable here
//!
//! Critical sections over the record are one struct copy or one field
//! store, so the lock is never held longer than a few memory accesses.
//! A sleeping, process-aware lock would cost more to enter than the
//! entire critical section it guards.
//!
//! # Memory Ordering
//!
//! The Acquire CAS / Release store pair makes every write performed
//! under the lock visible to the next process that acquires it, which
//! is the only cross-process visibility guarantee the store needs.

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Mutual-exclusion primitive usable from inside a shared mapping.
///
/// Implementations must be `#[repr(C)]`, fixed-size, and valid at any
/// mapped address. The seam exists so the spin lock can be swapped for
/// e.g. a futex-based primitive without touching any call site.
pub trait ShmLock {
    /// Put the lock into the unlocked state. Called once by the segment
    /// creator before the handle is published; never called on a lock
    /// another process might already be spinning on.
    fn init(&self);

    /// Block (spin) until the lock is held by the calling process.
    fn acquire(&self);

    /// Release a lock previously acquired by the calling process.
    fn release(&self);
}

/// Test-and-set spin lock over a single `AtomicU32`.
#[repr(C)]
pub struct SpinLock {
    state: AtomicU32,
}

impl SpinLock {
    /// An unlocked lock, for embedding in a freshly written record.
    pub const fn unlocked() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }
}

impl ShmLock for SpinLock {
    #[inline]
    fn init(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    #[inline]
    fn acquire(&self) {
        loop {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            // Spin on plain loads until the holder releases; avoids
            // hammering the cache line with failed CAS attempts.
            while self.state.load(Ordering::Relaxed) == LOCKED {
                std::hint::spin_loop();
            }
        }
    }

    #[inline]
    fn release(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::mem::{align_of, size_of};
    use std::sync::Arc;

    #[test]
    fn lock_is_one_word() {
        assert_eq!(size_of::<SpinLock>(), 4);
        assert_eq!(align_of::<SpinLock>(), 4);
    }

    /// Non-atomic counter bumped only under the lock; Sync so threads
    /// can share it the way processes share the mapped record.
    struct Guarded {
        lock: SpinLock,
        count: UnsafeCell<u64>,
    }
    unsafe impl Sync for Guarded {}

    #[test]
    fn acquire_excludes_concurrent_writers() {
        const THREADS: usize = 4;
        const ITERS: u64 = 50_000;

        let shared = Arc::new(Guarded {
            lock: SpinLock::unlocked(),
            count: UnsafeCell::new(0),
        });

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..ITERS {
                        shared.lock.acquire();
                        // SAFETY: the lock serializes access to count
                        unsafe { *shared.count.get() += 1 };
                        shared.lock.release();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(unsafe { *shared.count.get() }, THREADS as u64 * ITERS);
    }

    #[test]
    fn init_resets_to_unlocked() {
        let lock = SpinLock::unlocked();
        lock.acquire();
        lock.init();
        // Would deadlock if init did not clear the held state.
        lock.acquire();
        lock.release();
    }
}
