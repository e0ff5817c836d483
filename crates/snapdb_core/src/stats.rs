//! Database statistics and telemetry.
//!
//! All counters are atomic and can be read while operations are in
//! progress. Values are monotonically increasing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live database counters.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    /// Read transactions started.
    reads_started: AtomicU64,
    /// Read-only transactions started.
    read_only_started: AtomicU64,
    /// Writing transactions admitted (immediately or from the queue).
    writers_admitted: AtomicU64,
    /// Write-admission requests that had to wait in the queue.
    writers_queued: AtomicU64,
    /// Writing transactions committed.
    commits: AtomicU64,
    /// Writing transactions reverted (aborted or dropped).
    reverts: AtomicU64,
    /// Optimistic upgrades refused with a retry error.
    retries: AtomicU64,
    /// Copy-on-write forks taken during writer admission.
    snapshots_forked: AtomicU64,
    /// Snapshots disposed (inline or from the deferred bin).
    snapshots_disposed: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read_started(&self) {
        self.reads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_only_started(&self) {
        self.read_only_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writer_admitted(&self) {
        self.writers_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writer_queued(&self) {
        self.writers_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_revert(&self) {
        self.reverts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forked(&self, count: u64) {
        self.snapshots_forked.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_disposed(&self, count: u64) {
        self.snapshots_disposed.fetch_add(count, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self, entry_count: u64) -> StatsSnapshot {
        StatsSnapshot {
            entry_count,
            reads_started: self.reads_started.load(Ordering::Relaxed),
            read_only_started: self.read_only_started.load(Ordering::Relaxed),
            writers_admitted: self.writers_admitted.load(Ordering::Relaxed),
            writers_queued: self.writers_queued.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            reverts: self.reverts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            snapshots_forked: self.snapshots_forked.load(Ordering::Relaxed),
            snapshots_disposed: self.snapshots_disposed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`DatabaseStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Entries in the current committed version.
    pub entry_count: u64,
    /// Read transactions started.
    pub reads_started: u64,
    /// Read-only transactions started.
    pub read_only_started: u64,
    /// Writing transactions admitted.
    pub writers_admitted: u64,
    /// Write-admission requests that waited in the queue.
    pub writers_queued: u64,
    /// Writing transactions committed.
    pub commits: u64,
    /// Writing transactions reverted.
    pub reverts: u64,
    /// Optimistic upgrades refused.
    pub retries: u64,
    /// Copy-on-write forks taken during writer admission.
    pub snapshots_forked: u64,
    /// Snapshots disposed.
    pub snapshots_disposed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "KeyValueCount:{}", self.entry_count)?;
        writeln!(f, "ReadTransactions:{}", self.reads_started)?;
        writeln!(f, "ReadOnlyTransactions:{}", self.read_only_started)?;
        writeln!(f, "WritersAdmitted:{}", self.writers_admitted)?;
        writeln!(f, "WritersQueued:{}", self.writers_queued)?;
        writeln!(f, "Commits:{}", self.commits)?;
        writeln!(f, "Reverts:{}", self.reverts)?;
        writeln!(f, "Retries:{}", self.retries)?;
        writeln!(f, "SnapshotsForked:{}", self.snapshots_forked)?;
        writeln!(f, "SnapshotsDisposed:{}", self.snapshots_disposed)
    }
}
