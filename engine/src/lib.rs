//! # Tether Engine
//!
//! The deterministic state core for the Tether sync client.
//!
//! This crate holds the pure logic of client-side state synchronization:
//! the local copy of the shared record collection, the delta-merge rules
//! that repair it after missed events, and the checkpoint arithmetic that
//! tracks how far reconciliation has progressed.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of sockets, storage, or timers
//! - **Deterministic**: the same inputs always produce the same state
//! - **Idempotent merges**: replaying an already-applied delta is a no-op
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! The server publishes records with:
//! - Unique ID
//! - JSON field payload
//! - Owner and last-editor identities
//! - Version number (optimistic-concurrency token, server-incremented)
//! - Related entity ids and created/updated timestamps
//!
//! ### Collection
//!
//! [`Collection`] is the local copy of the shared collection. Every mutation
//! path replaces whole records by id; a replacement carrying a lower version
//! than the resident record is ignored, so a record's version never
//! decreases no matter how deliveries interleave.
//!
//! ### Delta merges
//!
//! [`ChangeSet`] is one delta-endpoint response. [`ChangeSet::merge_into`]
//! applies deletions before upserts, so a deletion always wins over an
//! upsert of the same id within one response.
//!
//! ### Checkpoints
//!
//! [`Checkpoint`] marks the last successfully reconciled point. It only
//! moves forward; callers advance it after a merge completes, never before.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{ChangeSet, Checkpoint, Collection, DeletedRecord, Record};
//! use serde_json::json;
//!
//! let mut collection = Collection::new();
//! let mut checkpoint = Checkpoint::new(0);
//!
//! // A delta response from the server: one upsert, one deletion.
//! let response = ChangeSet {
//!     updated_records: vec![
//!         Record::new("list-1", json!({"title": "Groceries"}), "ana", 1_706_745_600_000),
//!     ],
//!     deleted_records: vec![DeletedRecord { id: "list-9".into() }],
//!     current_timestamp: 1_706_745_601_000,
//! };
//!
//! let summary = response.merge_into(&mut collection);
//! assert_eq!(summary.upserted, 1);
//! assert!(collection.contains("list-1"));
//!
//! // The checkpoint advances only after the merge completed.
//! checkpoint.advance(response.current_timestamp);
//! assert_eq!(checkpoint.millis(), 1_706_745_601_000);
//! ```

pub mod checkpoint;
pub mod collection;
pub mod delta;
pub mod error;
pub mod record;

// Re-export main types at crate root
pub use checkpoint::Checkpoint;
pub use collection::Collection;
pub use delta::{ChangeSet, DeletedRecord, MergeSummary};
pub use error::Error;
pub use record::Record;

/// Type aliases for clarity
pub type RecordId = String;
pub type Version = u64;
pub type Timestamp = u64;
