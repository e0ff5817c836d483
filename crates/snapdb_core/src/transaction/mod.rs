//! Transaction management with snapshot isolation.
//!
//! Readers always see a consistent, immutable snapshot; at most one
//! writer mutates a private copy-on-write fork at a time; commits
//! atomically publish a new snapshot; aborted writes roll back without
//! disturbing readers.

mod disposal;
mod manager;
mod queue;
mod state;

pub use manager::VersionManager;
pub use queue::WriteRequest;
pub use state::{Transaction, TransactionKind, TransactionState};
