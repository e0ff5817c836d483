//! # SnapDB Core
//!
//! MVCC transaction core for SnapDB, an embedded in-memory key-value
//! store built on a copy-on-write tree.
//!
//! This crate provides:
//! - Snapshot isolation: readers always see a consistent committed
//!   version, regardless of what the writer is doing.
//! - Single-writer serialization with FIFO admission of queued writers.
//! - Atomic commit publishing a new version; abort rolls back without
//!   disturbing readers.
//! - Explicit snapshot reference counting with deferred disposal off the
//!   readers' hot path.
//!
//! The versioned tree itself lives in the `snapdb_tree` crate; this
//! crate only manages versions and transactions over it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod stats;
mod transaction;
mod types;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{
    Transaction, TransactionKind, TransactionState, VersionManager, WriteRequest,
};
pub use types::TransactionId;
