//! The version manager.
//!
//! Owns the last-committed snapshot pointer, the identity of the active
//! writer, the FIFO writer admission queue and the deferred-disposal bin.
//!
//! ## Locking
//!
//! Two locks, always taken in this order:
//!
//! 1. `writer`, the serialization lock. Admission, commit, revert,
//!    upgrade and shutdown hold it for their full critical section.
//! 2. `published`, an `RwLock` guarding only the last-committed pointer.
//!    Readers take it shared to pair the pointer read with the refcount
//!    increment; the writer path takes it exclusive to swap the pointer.
//!
//! Readers never touch the serialization lock. The `published` lock is
//! what makes the pointer-read-plus-increment atomic with respect to a
//! concurrent commit swap: a swap cannot complete between a reader
//! loading the pointer and referencing it, so a dispose can never fire
//! against a snapshot with a reader increment in flight.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::transaction::disposal::DisposalBin;
use crate::transaction::queue::{WaiterSlot, WriteRequest};
use crate::transaction::state::{Transaction, TransactionKind};
use crate::types::TransactionId;
use parking_lot::{Mutex, RwLock};
use snapdb_tree::{Snapshot, SnapshotRef};
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// State guarded by the serialization lock.
#[derive(Debug, Default)]
struct WriterState {
    /// The active writing transaction, if any.
    active: Option<TransactionId>,
    /// FIFO queue of pending write-admission requests.
    queue: VecDeque<Arc<WaiterSlot>>,
}

/// Serializes writers over a chain of copy-on-write snapshots.
///
/// At most one writing transaction exists at any instant; commits
/// atomically publish a new snapshot; readers are admitted without ever
/// taking the serialization lock.
#[derive(Debug)]
pub struct VersionManager {
    /// The last-committed snapshot; always non-null, always holding one
    /// reference owned by the manager itself.
    published: RwLock<SnapshotRef>,
    /// Serialization lock for all writer-side state transitions.
    writer: Mutex<WriterState>,
    /// Snapshots whose refcount hit zero on a reader's teardown path.
    disposal: DisposalBin,
    /// Shared counters.
    stats: Arc<DatabaseStats>,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Set by `close`; all further admissions are refused.
    closed: AtomicBool,
    /// Durability hint for freshly created roots.
    durable: bool,
}

impl VersionManager {
    /// Creates a manager over a fresh empty root.
    #[must_use]
    pub fn new(config: &Config, stats: Arc<DatabaseStats>) -> Arc<Self> {
        Arc::new(Self {
            published: RwLock::new(Snapshot::create_empty(config.durable_transactions)),
            writer: Mutex::new(WriterState::default()),
            disposal: DisposalBin::new(),
            stats,
            next_txid: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            durable: config.durable_transactions,
        })
    }

    /// Returns the durability hint the manager was created with.
    #[must_use]
    pub fn durable_transactions(&self) -> bool {
        self.durable
    }

    /// Returns the entry count of the current committed version.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.published.read().entry_count()
    }

    /// Starts a read transaction on the current committed version.
    ///
    /// Never blocks on the serialization lock; the shared `published`
    /// lock pairs the pointer read with the refcount increment.
    pub fn begin_read(self: &Arc<Self>) -> CoreResult<Transaction> {
        let snapshot = self.reference_published()?;
        self.stats.record_read_started();
        Ok(Transaction::new(
            Arc::clone(self),
            self.allocate_txid(),
            snapshot,
            TransactionKind::Read,
        ))
    }

    /// Starts a read-only transaction; upgrade attempts are refused.
    pub fn begin_read_only(self: &Arc<Self>) -> CoreResult<Transaction> {
        let snapshot = self.reference_published()?;
        self.stats.record_read_only_started();
        Ok(Transaction::new(
            Arc::clone(self),
            self.allocate_txid(),
            snapshot,
            TransactionKind::ReadOnly,
        ))
    }

    /// Requests admission as the writing transaction.
    ///
    /// Granted immediately when no writer is active, otherwise the
    /// request joins the FIFO queue and resolves when its turn comes.
    pub fn request_write(self: &Arc<Self>) -> CoreResult<WriteRequest> {
        let slot = Arc::new(WaiterSlot::new());
        let orphan = {
            let mut state = self.writer.lock();
            // `close` sets the flag under this lock, so the check here
            // cannot race a concurrent shutdown.
            self.ensure_open()?;
            self.drain_disposal();
            if state.active.is_none() {
                let transaction = self.admit_locked(&mut state);
                slot.grant(transaction)
            } else {
                self.stats.record_writer_queued();
                trace!(queued = state.queue.len() + 1, "writer request queued");
                state.queue.push_back(Arc::clone(&slot));
                None
            }
        };
        // A fresh slot cannot have been cancelled; defensive teardown
        // outside the lock.
        drop(orphan);
        Ok(WriteRequest::new(slot, Arc::clone(self)))
    }

    /// Optimistic upgrade of a read transaction to the writer.
    ///
    /// Fails with a retry error if another writer is active or if the
    /// committed version moved past `expected`, and with
    /// [`CoreError::DatabaseClosed`] after shutdown. On success the upgrading
    /// reader's own reference on `expected` is released and the caller
    /// receives a private fork to mutate.
    pub(crate) fn promote(
        &self,
        id: TransactionId,
        expected: &SnapshotRef,
    ) -> CoreResult<SnapshotRef> {
        let mut state = self.writer.lock();
        // A reader can outlive `close`; it must not become a writer on a
        // shut-down manager (the published root is already retired).
        self.ensure_open()?;
        self.drain_disposal();
        if state.active.is_some() {
            self.stats.record_retry();
            return Err(CoreError::retry("another writing transaction is running"));
        }
        let (working, old) = {
            let mut published = self.published.write();
            if !Arc::ptr_eq(&*published, expected) {
                drop(published);
                drop(state);
                self.stats.record_retry();
                return Err(CoreError::retry(
                    "another writing transaction already committed",
                ));
            }
            self.fork_published_locked(&mut published)
        };
        self.retire(&old);
        // The upgrading reader's own reference on the same root.
        self.retire(expected);
        state.active = Some(id);
        self.stats.record_writer_admitted();
        debug!(%id, "read transaction promoted to writer");
        Ok(working)
    }

    /// Publishes `working` as the new committed version.
    ///
    /// Clears the active writer, retires the previous committed snapshot
    /// and admits the next queued waiter, if any.
    pub(crate) fn commit(self: &Arc<Self>, working: SnapshotRef) {
        let orphan = {
            let mut state = self.writer.lock();
            self.drain_disposal();
            let id = state.active.take();
            let old = {
                let mut published = self.published.write();
                mem::replace(&mut *published, working)
            };
            self.retire(&old);
            self.stats.record_commit();
            trace!(id = ?id, "writing transaction committed");
            self.admit_next_locked(&mut state)
        };
        // A transaction granted to a waiter that cancelled in the same
        // instant is torn down here, outside the serialization lock.
        drop(orphan);
    }

    /// Discards the writer's mutations and reinstates the committed
    /// content.
    ///
    /// The reverted snapshot object itself becomes the published one, so
    /// the pointer keeps naming an object produced by this writer chain
    /// and the next admission forks from it without extra allocation.
    pub(crate) fn revert(self: &Arc<Self>, working: SnapshotRef) {
        let orphan = {
            let mut state = self.writer.lock();
            self.drain_disposal();
            let id = state.active.take();
            let old = {
                let mut published = self.published.write();
                working.revert_to(&published);
                mem::replace(&mut *published, working)
            };
            self.retire(&old);
            self.stats.record_revert();
            trace!(id = ?id, "writing transaction reverted");
            self.admit_next_locked(&mut state)
        };
        drop(orphan);
    }

    /// Releases a reader's snapshot reference.
    ///
    /// Runs on reader teardown, concurrently with anything the writer
    /// side is doing; on the zero transition the snapshot is parked in
    /// the disposal bin rather than disposed inline, so readers never
    /// contend for the serialization lock.
    pub(crate) fn release_read(&self, snapshot: &SnapshotRef) {
        if snapshot.dereference() {
            trace!("reader retired the last reference, deferring disposal");
            self.disposal.defer(Arc::clone(snapshot));
        }
    }

    /// Removes a cancelled request from the admission queue.
    ///
    /// If the grant raced the cancellation, the orphaned writing
    /// transaction is torn down outside the lock (which reverts it and
    /// admits the next waiter).
    pub(crate) fn cancel_waiter(&self, slot: &Arc<WaiterSlot>) {
        let orphan = {
            let mut state = self.writer.lock();
            state.queue.retain(|queued| !Arc::ptr_eq(queued, slot));
            slot.cancel()
        };
        drop(orphan);
    }

    /// Shuts the manager down.
    ///
    /// Fails with [`CoreError::WriterActive`] while a writing transaction
    /// runs. Cancels every pending waiter in FIFO order, releases the
    /// committed snapshot and drains the disposal bin. Safe to call more
    /// than once; later calls are no-ops.
    pub fn close(&self) -> CoreResult<()> {
        let orphans = {
            let mut state = self.writer.lock();
            if state.active.is_some() {
                return Err(CoreError::WriterActive);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            let orphans: Vec<_> = state
                .queue
                .drain(..)
                .filter_map(|slot| slot.cancel())
                .collect();
            {
                let published = self.published.write();
                self.closed.store(true, Ordering::SeqCst);
                self.retire(&published);
            }
            self.drain_disposal();
            debug!("version manager closed");
            orphans
        };
        drop(orphans);
        Ok(())
    }

    /// Returns true once [`VersionManager::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::DatabaseClosed);
        }
        Ok(())
    }

    fn allocate_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    /// Reads the published pointer and takes a reference, atomically with
    /// respect to a commit swap.
    fn reference_published(&self) -> CoreResult<SnapshotRef> {
        let published = self.published.read();
        self.ensure_open()?;
        published.reference();
        Ok(Arc::clone(&*published))
    }

    /// Two-fork admission with the published write lock held: the first
    /// fork becomes the writer's private copy, the second replaces the
    /// published pointer. The previous published snapshot is returned for
    /// retirement; readers that already captured it are unaffected.
    fn fork_published_locked(
        &self,
        published: &mut SnapshotRef,
    ) -> (SnapshotRef, SnapshotRef) {
        let working = published.fork();
        let republished = published.fork();
        self.stats.record_forked(2);
        let old = mem::replace(published, republished);
        (working, old)
    }

    /// Admits a new writing transaction. Caller holds the serialization
    /// lock and has verified no writer is active.
    fn admit_locked(self: &Arc<Self>, state: &mut WriterState) -> Transaction {
        debug_assert!(state.active.is_none());
        let id = self.allocate_txid();
        let (working, old) = {
            let mut published = self.published.write();
            self.fork_published_locked(&mut published)
        };
        self.retire(&old);
        state.active = Some(id);
        self.stats.record_writer_admitted();
        debug!(%id, "writing transaction admitted");
        Transaction::new(Arc::clone(self), id, working, TransactionKind::Writer)
    }

    /// Grants the writer slot to the first still-live queued waiter.
    ///
    /// Cancelled entries are skipped; cancellation takes the
    /// serialization lock, so a skip cannot race a late `wait`.
    /// On the unreachable-under-lock-discipline path where the grant is
    /// refused, the already-admitted transaction is returned; dropping it
    /// outside the lock reverts it and admits the next waiter.
    fn admit_next_locked(self: &Arc<Self>, state: &mut WriterState) -> Option<Transaction> {
        while let Some(slot) = state.queue.pop_front() {
            if slot.is_cancelled() {
                continue;
            }
            let transaction = self.admit_locked(state);
            match slot.grant(transaction) {
                None => return None,
                Some(orphan) => return Some(orphan),
            }
        }
        None
    }

    /// Dereferences a snapshot the writer side no longer needs, disposing
    /// it immediately on the zero transition. Caller holds the
    /// serialization lock, so inline disposal is safe here.
    fn retire(&self, snapshot: &Snapshot) {
        if snapshot.dereference() {
            snapshot.dispose();
            self.stats.record_disposed(1);
        }
    }

    /// Disposes everything readers parked since the last drain.
    fn drain_disposal(&self) {
        let drained = self.disposal.drain();
        if drained > 0 {
            self.stats.record_disposed(drained);
            trace!(drained, "drained deferred snapshots");
        }
    }

    #[cfg(test)]
    pub(crate) fn active_writer(&self) -> Option<TransactionId> {
        self.writer.lock().active
    }

    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.writer.lock().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn disposal_len(&self) -> usize {
        self.disposal.len()
    }

    #[cfg(test)]
    pub(crate) fn published_handle(&self) -> SnapshotRef {
        Arc::clone(&*self.published.read())
    }
}

impl Drop for VersionManager {
    fn drop(&mut self) {
        // The last reader may have parked its snapshot after close.
        self.drain_disposal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<VersionManager> {
        VersionManager::new(&Config::default(), Arc::new(DatabaseStats::new()))
    }

    fn begin_write(manager: &Arc<VersionManager>) -> Transaction {
        manager.request_write().unwrap().wait().unwrap()
    }

    #[test]
    fn fresh_manager_is_empty() {
        let vm = manager();
        let txn = vm.begin_read().unwrap();
        assert_eq!(txn.entry_count().unwrap(), 0);
        assert_eq!(txn.get(b"a").unwrap(), None);
    }

    #[test]
    fn committed_write_visible_to_new_reader() {
        let vm = manager();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![1]).unwrap();
        writer.commit().unwrap();

        let reader = vm.begin_read().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), Some(vec![1]));
    }

    #[test]
    fn abort_restores_previous_content() {
        let vm = manager();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![1]).unwrap();
        writer.commit().unwrap();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![2]).unwrap();
        writer.put(b"b".to_vec(), vec![3]).unwrap();
        writer.abort().unwrap();

        let reader = vm.begin_read().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), Some(vec![1]));
        assert_eq!(reader.get(b"b").unwrap(), None);
    }

    #[test]
    fn dropped_writer_reverts() {
        let vm = manager();

        {
            let mut writer = begin_write(&vm);
            writer.put(b"a".to_vec(), vec![1]).unwrap();
        }

        let reader = vm.begin_read().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), None);
        assert_eq!(vm.active_writer(), None);
    }

    #[test]
    fn reader_keeps_its_snapshot_across_commits() {
        let vm = manager();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![1]).unwrap();
        writer.commit().unwrap();

        let reader = vm.begin_read().unwrap();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![2]).unwrap();
        writer.commit().unwrap();

        // Unchanged view from before the second commit.
        assert_eq!(reader.get(b"a").unwrap(), Some(vec![1]));

        let fresh = vm.begin_read().unwrap();
        assert_eq!(fresh.get(b"a").unwrap(), Some(vec![2]));
    }

    #[test]
    fn reader_does_not_see_uncommitted_writes() {
        let vm = manager();

        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![1]).unwrap();

        let reader = vm.begin_read().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), None);

        writer.commit().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), None);
    }

    #[test]
    fn second_write_request_queues_until_commit() {
        let vm = manager();

        let writer = begin_write(&vm);
        let mut request = vm.request_write().unwrap();
        assert!(request.try_take().unwrap().is_none());
        assert_eq!(vm.queue_len(), 1);

        writer.commit().unwrap();
        let next = request.try_take().unwrap().expect("admitted after commit");
        assert!(next.is_writer());
    }

    #[test]
    fn writers_admitted_in_request_order() {
        let vm = manager();

        let first = begin_write(&vm);
        let mut second = vm.request_write().unwrap();
        let mut third = vm.request_write().unwrap();

        first.commit().unwrap();
        let second_txn = second.try_take().unwrap().expect("second admitted");
        assert!(third.try_take().unwrap().is_none());

        second_txn.commit().unwrap();
        assert!(third.try_take().unwrap().is_some());
    }

    #[test]
    fn cancelled_request_does_not_block_the_queue() {
        let vm = manager();

        let writer = begin_write(&vm);
        let second = vm.request_write().unwrap();
        let mut third = vm.request_write().unwrap();

        second.cancel();
        writer.commit().unwrap();

        assert!(third.try_take().unwrap().is_some());
    }

    #[test]
    fn promote_succeeds_without_contention() {
        let vm = manager();

        let mut txn = vm.begin_read().unwrap();
        txn.put(b"a".to_vec(), vec![1]).unwrap();
        assert!(txn.is_writer());
        txn.commit().unwrap();

        let reader = vm.begin_read().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), Some(vec![1]));
    }

    #[test]
    fn promote_fails_while_writer_active() {
        let vm = manager();

        let _writer = begin_write(&vm);
        let mut txn = vm.begin_read().unwrap();
        let err = txn.put(b"a".to_vec(), vec![1]).unwrap_err();
        assert!(err.is_retryable());
        assert!(!txn.is_writer());
    }

    #[test]
    fn promote_fails_after_concurrent_commit() {
        let vm = manager();

        let mut txn = vm.begin_read().unwrap();

        let mut writer = begin_write(&vm);
        writer.put(b"x".to_vec(), vec![9]).unwrap();
        writer.commit().unwrap();

        let err = txn.put(b"a".to_vec(), vec![1]).unwrap_err();
        assert!(err.is_retryable());
        // The failed upgrade left the original view intact.
        assert_eq!(txn.get(b"x").unwrap(), None);
    }

    #[test]
    fn read_only_transaction_refuses_writes() {
        let vm = manager();
        let mut txn = vm.begin_read_only().unwrap();
        assert!(matches!(
            txn.put(b"a".to_vec(), vec![1]),
            Err(CoreError::ReadOnly)
        ));
    }

    #[test]
    fn close_fails_while_writer_active_then_succeeds() {
        let vm = manager();

        let writer = begin_write(&vm);
        assert!(matches!(vm.close(), Err(CoreError::WriterActive)));

        writer.commit().unwrap();
        vm.close().unwrap();
        assert!(vm.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let vm = manager();
        vm.close().unwrap();
        vm.close().unwrap();
    }

    #[test]
    fn begin_after_close_fails() {
        let vm = manager();
        vm.close().unwrap();
        assert!(matches!(vm.begin_read(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            vm.request_write(),
            Err(CoreError::DatabaseClosed)
        ));
    }

    #[test]
    fn surviving_reader_cannot_upgrade_after_close() {
        let vm = manager();

        let mut reader = vm.begin_read().unwrap();
        vm.close().unwrap();

        assert!(matches!(
            reader.put(b"a".to_vec(), vec![1]),
            Err(CoreError::DatabaseClosed)
        ));
        assert!(!reader.is_writer());
        assert_eq!(vm.active_writer(), None);

        // The refused upgrade left the reader's view and reference intact.
        assert_eq!(reader.get(b"a").unwrap(), None);
        assert!(!reader.snapshot_handle().unwrap().is_disposed());
    }

    #[test]
    fn reader_teardown_defers_disposal_until_next_writer_event() {
        let vm = manager();

        let reader = vm.begin_read().unwrap();
        let retired = Arc::clone(reader.snapshot_handle().unwrap());

        // Admitting a writer re-points the published snapshot; the old
        // root stays alive because the reader still references it.
        let writer = begin_write(&vm);
        assert!(!retired.is_disposed());

        drop(reader);
        assert_eq!(vm.disposal_len(), 1);
        assert!(!retired.is_disposed());

        // The next serialization point drains the bin.
        writer.commit().unwrap();
        assert_eq!(vm.disposal_len(), 0);
        assert!(retired.is_disposed());
    }

    #[test]
    fn commit_retires_previous_published_snapshot() {
        let vm = manager();

        let before = vm.published_handle();
        let mut writer = begin_write(&vm);
        writer.put(b"a".to_vec(), vec![1]).unwrap();

        // Admission already retired the initial root (no readers held it).
        assert!(before.is_disposed());

        let during = vm.published_handle();
        writer.commit().unwrap();
        assert!(during.is_disposed());
        assert!(!vm.published_handle().is_disposed());
    }

    #[test]
    fn all_snapshots_disposed_after_close() {
        let vm = manager();

        for round in 0..5u8 {
            let mut writer = begin_write(&vm);
            writer.put(vec![round], vec![round]).unwrap();
            writer.commit().unwrap();
        }
        let last = vm.published_handle();
        vm.close().unwrap();
        assert!(last.is_disposed());
        assert_eq!(vm.disposal_len(), 0);
    }

    #[test]
    fn late_reader_release_is_drained_on_manager_drop() {
        let vm = manager();
        let reader = vm.begin_read().unwrap();
        let retired = Arc::clone(reader.snapshot_handle().unwrap());

        vm.close().unwrap();
        assert!(!retired.is_disposed());

        // The reader outlived close; its release parks the snapshot and
        // the manager's drop drains it.
        drop(reader);
        drop(vm);
        assert!(retired.is_disposed());
    }
}
