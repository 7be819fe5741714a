//! The thread-coordination contract this crate consumes from its host
//! (spec §6), plus a `std`-backed reference implementation.
//!
//! The core never spawns threads itself: a fixed pool of `nth` native
//! threads calls [`crate::dispatch::matmul`] concurrently, each bringing its
//! own `ith` in `[0, nth)`. [`ThreadPool`] is the three-primitive contract
//! that concurrency depends on; [`StdThreadPool`] is a reference
//! implementation built on `std::sync::{Barrier, atomic::AtomicUsize}`,
//! shipped so this crate's own tests and benchmarks have a real pool to
//! drive without depending on whatever scheduler a host application uses.
//! It is not a production recommendation - a host's graph scheduler is
//! expected to supply its own pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;

/// The coordination primitives [`crate::dispatch::matmul`] requires of its
/// host pool.
///
/// All three methods are re-entrant across distinct invocations of `matmul`
/// sharing the same pool: the counter is reset via `chunk_set` before every
/// opening barrier, so no job id can leak from one call into the next.
pub trait ThreadPool: Sync {
    /// Number of participants in this pool.
    fn nth(&self) -> usize;

    /// Blocks until all `nth` participants have called `barrier`.
    fn barrier(&self);

    /// Stores `value` into the shared job counter. Ordering: happens-before
    /// the next `barrier` return, per the spec's sequentially-consistent
    /// (or acquire/release with a release fence on this store) requirement.
    fn chunk_set(&self, value: usize);

    /// Atomically adds `delta` to the shared job counter, returning the
    /// value before the add.
    fn chunk_add(&self, delta: usize) -> usize;
}

/// Per-thread dispatch parameters: this worker's identity, the pool size,
/// and a borrow of the pool itself.
///
/// Mirrors the spec's "kernel object... binding... thread identity"
/// (§3): constructed fresh by the caller for each [`crate::dispatch::matmul`]
/// call, never persisted.
pub struct Params<'a> {
    /// This worker's identity in `[0, nth)`.
    pub ith: usize,
    /// Total number of workers participating in this call.
    pub nth: usize,
    /// The shared coordination pool.
    pub pool: &'a dyn ThreadPool,
}

/// Reference [`ThreadPool`] implementation built on `std::sync` primitives.
///
/// `barrier` is called exactly twice per [`crate::dispatch::matmul`]
/// invocation on the floating-point path (opening and closing); `std::sync::Barrier`
/// resets its generation after every party arrives, so one `Barrier`
/// instance safely serves both waits across repeated calls as long as the
/// same `nth` threads participate each time.
pub struct StdThreadPool {
    nth: usize,
    barrier: Barrier,
    counter: AtomicUsize,
}

impl StdThreadPool {
    /// Creates a pool sized for `nth` participants.
    #[must_use]
    pub fn new(nth: usize) -> Self {
        Self {
            nth,
            barrier: Barrier::new(nth.max(1)),
            counter: AtomicUsize::new(0),
        }
    }

    /// Builds the [`Params`] for worker `ith`.
    ///
    /// # Panics
    ///
    /// Panics if `ith >= nth` (the same precondition [`crate::dispatch::matmul`]
    /// asserts on entry).
    #[must_use]
    pub fn params(&self, ith: usize) -> Params<'_> {
        assert!(ith < self.nth, "ith {ith} out of range for pool of size {}", self.nth);
        Params {
            ith,
            nth: self.nth,
            pool: self,
        }
    }

    /// Runs `f(ith)` on `nth` scoped threads and waits for all to finish.
    ///
    /// Convenience for tests and benchmarks that want a real fork-join
    /// rather than hand-written thread management per call site.
    pub fn scoped<F>(&self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        std::thread::scope(|scope| {
            for ith in 0..self.nth {
                let f = &f;
                scope.spawn(move || f(ith));
            }
        });
    }
}

impl ThreadPool for StdThreadPool {
    fn nth(&self) -> usize {
        self.nth
    }

    fn barrier(&self) {
        // `Barrier::wait` returns a `BarrierWaitResult` identifying the
        // leader; this pool has no leader-only work, so the result is discarded.
        let _ = self.barrier.wait();
    }

    fn chunk_set(&self, value: usize) {
        self.counter.store(value, Ordering::SeqCst);
    }

    fn chunk_add(&self, delta: usize) -> usize {
        self.counter.fetch_add(delta, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    #[test]
    fn chunk_add_returns_previous_value() {
        let pool = StdThreadPool::new(1);
        pool.chunk_set(10);
        assert_eq!(pool.chunk_add(5), 10);
        assert_eq!(pool.chunk_add(1), 15);
    }

    #[test]
    fn scoped_runs_every_worker_exactly_once() {
        let pool = StdThreadPool::new(4);
        let seen = Arc::new(StdAtomicUsize::new(0));
        pool.scoped(|_ith| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn barrier_releases_all_participants() {
        let pool = StdThreadPool::new(4);
        let before = Arc::new(StdAtomicUsize::new(0));
        let after = Arc::new(StdAtomicUsize::new(0));
        pool.scoped(|_ith| {
            before.fetch_add(1, Ordering::SeqCst);
            pool.barrier();
            // every participant must have incremented `before` by the time
            // any one of them resumes past the barrier.
            assert_eq!(before.load(Ordering::SeqCst), 4);
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(after.load(Ordering::SeqCst), 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn params_panics_on_out_of_range_ith() {
        let pool = StdThreadPool::new(2);
        let _ = pool.params(2);
    }
}
