//! Writer admission waiters.
//!
//! A request for write access either succeeds immediately or parks a
//! [`WaiterSlot`] in the manager's FIFO queue. The slot is a one-shot
//! cell fulfilled by the manager ("notify one" in request order) or
//! cancelled by the requester / by shutdown.

use crate::error::{CoreError, CoreResult};
use crate::transaction::manager::VersionManager;
use crate::transaction::state::Transaction;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;

/// One-shot state of a queued write request.
#[derive(Debug)]
enum WaiterState {
    /// Still queued; no writer slot granted yet.
    Pending,
    /// Granted; the writing transaction is parked here until taken.
    Ready(Transaction),
    /// Cancelled by the requester or by shutdown; never granted.
    Cancelled,
    /// The granted transaction was taken by the requester.
    Finished,
}

/// A single queued request to become the writing transaction.
#[derive(Debug)]
pub(crate) struct WaiterSlot {
    state: Mutex<WaiterState>,
    ready: Condvar,
}

impl WaiterSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WaiterState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Fulfills the slot with a freshly admitted writing transaction.
    ///
    /// Called with the manager's writer lock held, so it cannot race a
    /// cancellation. Returns the transaction back if the slot was already
    /// cancelled; the caller must tear it down outside the lock.
    pub(crate) fn grant(&self, transaction: Transaction) -> Option<Transaction> {
        let mut state = self.state.lock();
        match *state {
            WaiterState::Pending => {
                *state = WaiterState::Ready(transaction);
                self.ready.notify_one();
                None
            }
            _ => Some(transaction),
        }
    }

    /// Cancels the slot.
    ///
    /// If the slot was already granted, the orphaned transaction is
    /// returned so the caller can drop it outside the writer lock.
    pub(crate) fn cancel(&self) -> Option<Transaction> {
        let mut state = self.state.lock();
        let previous = mem::replace(&mut *state, WaiterState::Cancelled);
        self.ready.notify_one();
        match previous {
            WaiterState::Ready(transaction) => Some(transaction),
            _ => None,
        }
    }

    /// Returns true if the requester gave up on this slot.
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), WaiterState::Cancelled)
    }

    fn wait(&self) -> CoreResult<Transaction> {
        let mut state = self.state.lock();
        loop {
            match mem::replace(&mut *state, WaiterState::Finished) {
                WaiterState::Pending => {
                    *state = WaiterState::Pending;
                    self.ready.wait(&mut state);
                }
                WaiterState::Ready(transaction) => return Ok(transaction),
                WaiterState::Cancelled => {
                    *state = WaiterState::Cancelled;
                    return Err(CoreError::WriteCancelled);
                }
                WaiterState::Finished => return Err(CoreError::WriteCancelled),
            }
        }
    }

    fn try_take(&self) -> CoreResult<Option<Transaction>> {
        let mut state = self.state.lock();
        match mem::replace(&mut *state, WaiterState::Finished) {
            WaiterState::Pending => {
                *state = WaiterState::Pending;
                Ok(None)
            }
            WaiterState::Ready(transaction) => Ok(Some(transaction)),
            WaiterState::Cancelled => {
                *state = WaiterState::Cancelled;
                Err(CoreError::WriteCancelled)
            }
            WaiterState::Finished => Err(CoreError::WriteCancelled),
        }
    }
}

/// A pending request to become the writing transaction.
///
/// Returned by `request_write`. The request resolves when the current
/// writer (and all earlier requests) finish; dropping an unresolved
/// request cancels it without affecting other queue entries.
#[derive(Debug)]
#[must_use = "an unawaited write request holds a queue slot until dropped"]
pub struct WriteRequest {
    slot: Option<Arc<WaiterSlot>>,
    manager: Arc<VersionManager>,
}

impl WriteRequest {
    pub(crate) fn new(slot: Arc<WaiterSlot>, manager: Arc<VersionManager>) -> Self {
        Self {
            slot: Some(slot),
            manager,
        }
    }

    /// Blocks until this request is granted or cancelled.
    pub fn wait(mut self) -> CoreResult<Transaction> {
        match self.slot.take() {
            Some(slot) => slot.wait(),
            None => Err(CoreError::WriteCancelled),
        }
    }

    /// Returns the writing transaction if the request has been granted.
    ///
    /// `Ok(None)` means the request is still pending. After the
    /// transaction has been taken the request is spent.
    pub fn try_take(&mut self) -> CoreResult<Option<Transaction>> {
        let slot = self.slot.as_ref().ok_or(CoreError::WriteCancelled)?;
        let taken = slot.try_take()?;
        if taken.is_some() {
            self.slot = None;
        }
        Ok(taken)
    }

    /// Cancels this request, removing its queue entry.
    ///
    /// Other queued requests are unaffected. If the grant raced the
    /// cancellation, the granted transaction is reverted.
    pub fn cancel(mut self) {
        if let Some(slot) = self.slot.take() {
            self.manager.cancel_waiter(&slot);
        }
    }
}

impl Drop for WriteRequest {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.manager.cancel_waiter(&slot);
        }
    }
}
