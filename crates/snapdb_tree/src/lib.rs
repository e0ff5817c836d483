//! # SnapDB Tree
//!
//! Copy-on-write versioned tree for SnapDB.
//!
//! This crate provides the versioned storage structure underneath the SnapDB
//! transaction core. Each version of the database is a [`Snapshot`]: an
//! ordered byte-key/byte-value map that can be forked cheaply. Forks share
//! their content until one side mutates, at which point the mutating side
//! takes a private copy.
//!
//! ## Design Principles
//!
//! - Snapshots carry an **explicit** reference count ([`RefCount`]) instead
//!   of relying on `Arc` drop semantics. Exactly one caller observes the
//!   transition to zero and becomes responsible for calling
//!   [`Snapshot::dispose`]. This keeps the free-on-zero race auditable.
//! - Mutation is only legal on a snapshot with a single logical owner. The
//!   transaction core enforces this by always forking before handing a
//!   snapshot to a writer.
//! - Snapshots are `Send + Sync`; concurrent readers never block each other.
//!
//! ## Example
//!
//! ```rust
//! use snapdb_tree::Snapshot;
//!
//! let base = Snapshot::create_empty(false);
//! base.insert(b"k".to_vec(), b"v".to_vec());
//!
//! let fork = base.fork();
//! fork.insert(b"k".to_vec(), b"w".to_vec());
//!
//! // The fork diverged; the base is untouched.
//! assert_eq!(base.get(b"k"), Some(b"v".to_vec()));
//! assert_eq!(fork.get(b"k"), Some(b"w".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod refcount;
mod snapshot;

pub use refcount::RefCount;
pub use snapshot::{Snapshot, SnapshotRef};
