//! Database facade.

use crate::config::Config;
use crate::error::CoreResult;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::transaction::{Transaction, VersionManager, WriteRequest};
use std::sync::Arc;

/// The main database handle.
///
/// `Database` is the primary entry point for SnapDB. It wraps the
/// [`VersionManager`] and exposes the engine-level surface: starting
/// transactions, statistics, the compaction hook and shutdown.
///
/// The handle is cheap to clone and safe to share across threads.
///
/// # Example
///
/// ```rust
/// use snapdb_core::Database;
///
/// let db = Database::new();
///
/// let mut txn = db.begin_write()?;
/// txn.put(b"greeting".to_vec(), b"hello".to_vec())?;
/// txn.commit()?;
///
/// let txn = db.begin_read()?;
/// assert_eq!(txn.get(b"greeting")?, Some(b"hello".to_vec()));
/// # Ok::<(), snapdb_core::CoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    config: Config,
    manager: Arc<VersionManager>,
    stats: Arc<DatabaseStats>,
}

impl Database {
    /// Creates an empty in-memory database with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty in-memory database with the given configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let stats = Arc::new(DatabaseStats::new());
        let manager = VersionManager::new(&config, Arc::clone(&stats));
        Self {
            config,
            manager,
            stats,
        }
    }

    /// Starts a read transaction on the current committed version.
    pub fn begin_read(&self) -> CoreResult<Transaction> {
        self.manager.begin_read()
    }

    /// Starts a read-only transaction.
    ///
    /// Identical to [`Database::begin_read`] except that upgrade attempts
    /// are refused instead of queued behind the writer.
    pub fn begin_read_only(&self) -> CoreResult<Transaction> {
        self.manager.begin_read_only()
    }

    /// Requests admission as the writing transaction.
    ///
    /// Resolves immediately when no writer is active; otherwise the
    /// request waits its FIFO turn. Dropping the request cancels it.
    pub fn request_write(&self) -> CoreResult<WriteRequest> {
        self.manager.request_write()
    }

    /// Starts a writing transaction, blocking until admitted.
    pub fn begin_write(&self) -> CoreResult<Transaction> {
        self.request_write()?.wait()
    }

    /// Runs `f` inside a writing transaction and commits on success.
    ///
    /// If `f` returns an error the transaction is aborted and the error
    /// is propagated.
    pub fn write<T>(&self, f: impl FnOnce(&mut Transaction) -> CoreResult<T>) -> CoreResult<T> {
        let mut txn = self.begin_write()?;
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Runs `f` inside a read transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Transaction) -> CoreResult<T>) -> CoreResult<T> {
        let txn = self.begin_read()?;
        f(&txn)
    }

    /// Returns the number of entries in the current committed version.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.manager.entry_count()
    }

    /// Returns a point-in-time view of the database counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.entry_count())
    }

    /// Renders the coarse statistics string.
    ///
    /// The first line is `KeyValueCount:<n>` for the current committed
    /// version.
    #[must_use]
    pub fn calc_stats(&self) -> String {
        self.stats().to_string()
    }

    /// Compaction hook.
    ///
    /// The engine is memory-resident; there is nothing to compact.
    /// Always returns false.
    pub fn compact(&self) -> bool {
        false
    }

    /// History retention is unsupported; always `None`.
    #[must_use]
    pub fn preserve_history_up_to(&self) -> Option<u64> {
        None
    }

    /// History retention is unsupported; the value is ignored.
    pub fn set_preserve_history_up_to(&self, _commit: u64) {}

    /// Returns the durable-transactions hint.
    #[must_use]
    pub fn durable_transactions(&self) -> bool {
        self.config.durable_transactions
    }

    /// Closes the database.
    ///
    /// Fails with [`crate::CoreError::WriterActive`] while a writing
    /// transaction runs; pending write requests are cancelled. Later
    /// calls are no-ops.
    pub fn close(&self) -> CoreResult<()> {
        self.manager.close()
    }

    /// Returns true once the database has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
