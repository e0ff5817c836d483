//! Transaction handles and lifecycle.

use crate::error::{CoreError, CoreResult};
use crate::transaction::manager::VersionManager;
use crate::types::TransactionId;
use snapdb_tree::SnapshotRef;
use std::sync::Arc;

/// How a transaction may interact with the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Reads the snapshot it started on; may upgrade to writer.
    Read,
    /// Reads only; upgrade attempts are refused.
    ReadOnly,
    /// The single designated writer, mutating a private fork.
    Writer,
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted (or reverted on drop).
    Aborted,
}

/// A user-facing transaction over one snapshot.
///
/// Readers hold a reference to the committed snapshot they started on and
/// always see that consistent version. The writer holds a private
/// copy-on-write fork; its mutations become visible to others only at
/// [`Transaction::commit`].
///
/// Dropping an active transaction aborts it: a writer's mutations are
/// reverted, a reader's snapshot reference is released.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    manager: Arc<VersionManager>,
    snapshot: Option<SnapshotRef>,
    kind: TransactionKind,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(
        manager: Arc<VersionManager>,
        id: TransactionId,
        snapshot: SnapshotRef,
        kind: TransactionKind,
    ) -> Self {
        Self {
            id,
            manager,
            snapshot: Some(snapshot),
            kind,
            state: TransactionState::Active,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the kind of this transaction.
    ///
    /// A `Read` transaction becomes `Writer` after a successful upgrade.
    #[must_use]
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns true if this transaction is the designated writer.
    #[must_use]
    pub fn is_writer(&self) -> bool {
        self.kind == TransactionKind::Writer
    }

    fn active_snapshot(&self) -> CoreResult<&SnapshotRef> {
        self.snapshot.as_ref().ok_or(CoreError::TransactionClosed)
    }

    /// Looks up a key in this transaction's view.
    ///
    /// The writer sees its own uncommitted mutations; readers see the
    /// committed version they started on.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.active_snapshot()?.get(key))
    }

    /// Returns true if this transaction's view contains `key`.
    pub fn contains_key(&self, key: &[u8]) -> CoreResult<bool> {
        Ok(self.active_snapshot()?.contains_key(key))
    }

    /// Returns the number of entries in this transaction's view.
    pub fn entry_count(&self) -> CoreResult<u64> {
        Ok(self.active_snapshot()?.entry_count())
    }

    /// Returns every key in this transaction's view, in order.
    pub fn keys(&self) -> CoreResult<Vec<Vec<u8>>> {
        Ok(self.active_snapshot()?.content().keys().cloned().collect())
    }

    /// Inserts or updates a key.
    ///
    /// A `Read` transaction upgrades to writer on first write; the upgrade
    /// fails with [`CoreError::TransactionRetry`] if another writer is
    /// active or a commit happened since this transaction started.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        self.ensure_writable()?;
        self.active_snapshot()?.insert(key, value);
        Ok(())
    }

    /// Deletes a key, returning true if it was present.
    ///
    /// Upgrades like [`Transaction::put`].
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        self.ensure_writable()?;
        Ok(self.active_snapshot()?.remove(key).is_some())
    }

    /// Commits this transaction.
    ///
    /// For the writer, the private fork atomically becomes the new
    /// committed version and the next queued writer is admitted. For
    /// readers this simply releases the snapshot reference.
    pub fn commit(mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::TransactionClosed);
        }
        let snapshot = self.snapshot.take().ok_or(CoreError::TransactionClosed)?;
        match self.kind {
            TransactionKind::Writer => self.manager.commit(snapshot),
            TransactionKind::Read | TransactionKind::ReadOnly => {
                self.manager.release_read(&snapshot);
            }
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Aborts this transaction, discarding any mutations.
    pub fn abort(mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::TransactionClosed);
        }
        let snapshot = self.snapshot.take().ok_or(CoreError::TransactionClosed)?;
        match self.kind {
            TransactionKind::Writer => self.manager.revert(snapshot),
            TransactionKind::Read | TransactionKind::ReadOnly => {
                self.manager.release_read(&snapshot);
            }
        }
        self.state = TransactionState::Aborted;
        Ok(())
    }

    /// Ensures this transaction holds the writer slot, upgrading a `Read`
    /// transaction optimistically.
    fn ensure_writable(&mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::TransactionClosed);
        }
        match self.kind {
            TransactionKind::Writer => Ok(()),
            TransactionKind::ReadOnly => Err(CoreError::ReadOnly),
            TransactionKind::Read => {
                let expected = self.snapshot.as_ref().ok_or(CoreError::TransactionClosed)?;
                let working = self.manager.promote(self.id, expected)?;
                self.snapshot = Some(working);
                self.kind = TransactionKind::Writer;
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot_handle(&self) -> Option<&SnapshotRef> {
        self.snapshot.as_ref()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            match self.kind {
                TransactionKind::Writer => self.manager.revert(snapshot),
                TransactionKind::Read | TransactionKind::ReadOnly => {
                    self.manager.release_read(&snapshot);
                }
            }
        }
    }
}
