//! Deferred disposal of retired snapshots.
//!
//! Disposing a snapshot can be non-trivial, and readers finish at
//! arbitrary points while the writer path holds the serialization lock.
//! A reader that observes a refcount hit zero therefore never disposes
//! inline; it parks the snapshot here, and the version manager drains
//! the bin at every point where it already holds the serialization lock
//! (admission, commit, revert, shutdown). This bounds outstanding
//! un-disposed snapshots by writer-admission events, not reader churn.

use parking_lot::Mutex;
use snapdb_tree::SnapshotRef;
use std::mem;

/// Bin of snapshots whose refcount reached zero outside the writer lock.
#[derive(Debug, Default)]
pub(crate) struct DisposalBin {
    pending: Mutex<Vec<SnapshotRef>>,
}

impl DisposalBin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks a snapshot for later disposal.
    ///
    /// Never blocks on the writer lock; safe to call from reader teardown.
    pub(crate) fn defer(&self, snapshot: SnapshotRef) {
        self.pending.lock().push(snapshot);
    }

    /// Disposes everything currently parked, returning how many.
    ///
    /// The bin's own lock is held only for the swap; the actual disposal
    /// runs on the caller's thread afterwards.
    pub(crate) fn drain(&self) -> u64 {
        let parked = mem::take(&mut *self.pending.lock());
        let count = parked.len() as u64;
        for snapshot in parked {
            snapshot.dispose();
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
