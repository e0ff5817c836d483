//! Versioned tree roots.

use crate::refcount::RefCount;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tree content shared between forks.
///
/// Forks hold the same `Arc` until one side mutates; the first mutation
/// after a fork clones the map (`Arc::make_mut`), so copy-on-write happens
/// at whole-tree granularity.
type Content = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;

/// Shared handle to a [`Snapshot`].
///
/// The `Arc` keeps the allocation alive for the borrow checker; the
/// *logical* lifetime is governed by the explicit reference count and
/// [`Snapshot::dispose`].
pub type SnapshotRef = Arc<Snapshot>;

/// One immutable-until-forked version of the tree.
///
/// A snapshot is created by [`Snapshot::create_empty`] (engine init) or by
/// [`Snapshot::fork`] (copy-on-write fork). Holders register interest with
/// [`Snapshot::reference`] and release it with [`Snapshot::dereference`];
/// whichever caller observes the count reach zero disposes the snapshot,
/// directly or through the transaction core's deferred-disposal bin.
///
/// Mutation (`insert`/`remove`) is only legal on a snapshot with exactly
/// one logical owner: the active writing transaction's private fork.
#[derive(Debug)]
pub struct Snapshot {
    refs: RefCount,
    durable: bool,
    disposed: AtomicBool,
    content: RwLock<Content>,
}

impl Snapshot {
    /// Creates an empty versioned root with a reference count of one.
    ///
    /// `durable` is an engine-level hint carried on the handle; the tree
    /// itself is memory-resident either way.
    #[must_use]
    pub fn create_empty(durable: bool) -> SnapshotRef {
        Arc::new(Self {
            refs: RefCount::new(),
            durable,
            disposed: AtomicBool::new(false),
            content: RwLock::new(Arc::new(BTreeMap::new())),
        })
    }

    /// Increments the reference count.
    ///
    /// Callable concurrently from multiple readers.
    pub fn reference(&self) {
        debug_assert!(!self.is_disposed(), "reference() on a disposed snapshot");
        self.refs.increment();
    }

    /// Decrements the reference count.
    ///
    /// Returns true iff this call observed the transition to zero; that
    /// caller must arrange for [`Snapshot::dispose`] to run exactly once.
    #[must_use]
    pub fn dereference(&self) -> bool {
        self.refs.decrement()
    }

    /// Returns the current reference count (diagnostics only).
    #[must_use]
    pub fn ref_count(&self) -> u64 {
        self.refs.get()
    }

    /// Produces a copy-on-write fork of this snapshot.
    ///
    /// The fork starts with a reference count of one and shares content
    /// with its parent until either side mutates.
    #[must_use]
    pub fn fork(&self) -> SnapshotRef {
        debug_assert!(!self.is_disposed(), "fork() on a disposed snapshot");
        Arc::new(Self {
            refs: RefCount::new(),
            durable: self.durable,
            disposed: AtomicBool::new(false),
            content: RwLock::new(Arc::clone(&*self.content.read())),
        })
    }

    /// Discards this snapshot's mutations, restoring structural sharing
    /// with `target`.
    pub fn revert_to(&self, target: &Snapshot) {
        debug_assert!(!self.is_disposed(), "revert_to() on a disposed snapshot");
        let restored = Arc::clone(&*target.content.read());
        *self.content.write() = restored;
    }

    /// Frees this snapshot's exclusively-owned content.
    ///
    /// Caller contract: called exactly once, by whichever caller observed
    /// the reference count reach zero.
    pub fn dispose(&self) {
        let already = self.disposed.swap(true, Ordering::AcqRel);
        debug_assert!(!already, "dispose() called twice on the same snapshot");
        debug_assert_eq!(self.refs.get(), 0, "dispose() with live references");
        *self.content.write() = Arc::new(BTreeMap::new());
    }

    /// Returns true once [`Snapshot::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns the durability hint this root was created with.
    #[must_use]
    pub fn durable(&self) -> bool {
        self.durable
    }

    /// Returns the number of entries in this version.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.content.read().len() as u64
    }

    /// Looks up a key in this version.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.content.read().get(key).cloned()
    }

    /// Returns true if this version contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.content.read().contains_key(key)
    }

    /// Inserts a key/value pair, returning the previous value if any.
    ///
    /// Only the writing transaction's private fork may be mutated.
    pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        debug_assert!(!self.is_disposed(), "insert() on a disposed snapshot");
        let mut content = self.content.write();
        Arc::make_mut(&mut *content).insert(key, value)
    }

    /// Removes a key, returning the previous value if any.
    ///
    /// Only the writing transaction's private fork may be mutated.
    pub fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        debug_assert!(!self.is_disposed(), "remove() on a disposed snapshot");
        let mut content = self.content.write();
        Arc::make_mut(&mut *content).remove(key)
    }

    /// Returns a consistent view of the whole version for iteration.
    #[must_use]
    pub fn content(&self) -> Content {
        Arc::clone(&*self.content.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_empty_is_empty() {
        let snap = Snapshot::create_empty(false);
        assert_eq!(snap.entry_count(), 0);
        assert_eq!(snap.ref_count(), 1);
        assert!(!snap.durable());
    }

    #[test]
    fn insert_and_get() {
        let snap = Snapshot::create_empty(false);
        assert_eq!(snap.insert(b"a".to_vec(), b"1".to_vec()), None);
        assert_eq!(
            snap.insert(b"a".to_vec(), b"2".to_vec()),
            Some(b"1".to_vec())
        );
        assert_eq!(snap.get(b"a"), Some(b"2".to_vec()));
        assert!(snap.contains_key(b"a"));
        assert_eq!(snap.entry_count(), 1);
    }

    #[test]
    fn remove_returns_previous_value() {
        let snap = Snapshot::create_empty(false);
        snap.insert(b"a".to_vec(), b"1".to_vec());
        assert_eq!(snap.remove(b"a"), Some(b"1".to_vec()));
        assert_eq!(snap.remove(b"a"), None);
        assert_eq!(snap.entry_count(), 0);
    }

    #[test]
    fn fork_shares_content_until_mutation() {
        let base = Snapshot::create_empty(false);
        base.insert(b"a".to_vec(), b"1".to_vec());

        let fork = base.fork();
        assert!(Arc::ptr_eq(&base.content(), &fork.content()));

        fork.insert(b"b".to_vec(), b"2".to_vec());
        assert!(!Arc::ptr_eq(&base.content(), &fork.content()));
    }

    #[test]
    fn fork_mutation_does_not_affect_parent() {
        let base = Snapshot::create_empty(false);
        base.insert(b"a".to_vec(), b"1".to_vec());

        let fork = base.fork();
        fork.insert(b"a".to_vec(), b"2".to_vec());
        fork.remove(b"missing");

        assert_eq!(base.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(fork.get(b"a"), Some(b"2".to_vec()));
    }

    #[test]
    fn revert_restores_sharing() {
        let base = Snapshot::create_empty(false);
        base.insert(b"a".to_vec(), b"1".to_vec());

        let fork = base.fork();
        fork.insert(b"a".to_vec(), b"2".to_vec());
        fork.insert(b"b".to_vec(), b"3".to_vec());

        fork.revert_to(&base);
        assert_eq!(fork.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(fork.get(b"b"), None);
        assert!(Arc::ptr_eq(&base.content(), &fork.content()));
    }

    #[test]
    fn dereference_reports_zero_transition() {
        let snap = Snapshot::create_empty(false);
        snap.reference();
        assert!(!snap.dereference());
        assert!(snap.dereference());
    }

    #[test]
    fn dispose_clears_content() {
        let snap = Snapshot::create_empty(false);
        snap.insert(b"a".to_vec(), b"1".to_vec());
        assert!(snap.dereference());
        snap.dispose();
        assert!(snap.is_disposed());
        assert_eq!(snap.entry_count(), 0);
    }

    #[test]
    fn durable_hint_carries_across_forks() {
        let base = Snapshot::create_empty(true);
        assert!(base.fork().durable());
    }
}
