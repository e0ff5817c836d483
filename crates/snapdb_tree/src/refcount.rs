//! Explicit reference counting with an observable zero transition.

use std::sync::atomic::{AtomicU64, Ordering};

/// An explicit atomic reference count.
///
/// Unlike `Arc`, the count is part of the public contract: callers pair
/// every [`increment`](RefCount::increment) with exactly one
/// [`decrement`](RefCount::decrement), and exactly one decrement observes
/// the transition to zero. That caller becomes responsible for disposal.
///
/// The count starts at one, owned by the creator.
#[derive(Debug)]
pub struct RefCount(AtomicU64);

impl RefCount {
    /// Creates a count of one.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Increments the count.
    ///
    /// Safe to call concurrently from any thread that already holds a
    /// reference; an increment can never race a dispose because a live
    /// reference keeps the count above zero.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the count.
    ///
    /// Returns true iff this call observed the transition to zero. The
    /// `AcqRel` ordering makes all writes that happened before the other
    /// decrements visible to the caller that takes the zero branch.
    #[must_use]
    pub fn decrement(&self) -> bool {
        self.0.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Returns the current count.
    ///
    /// Only meaningful for diagnostics; the value may be stale by the time
    /// the caller looks at it.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}
