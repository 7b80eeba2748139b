//! Delta-reconciliation response and merge rules.
//!
//! # Algorithm
//!
//! 1. Apply every deletion in the response
//! 2. Apply upserts, skipping any id the same response deleted
//! 3. The caller advances its checkpoint only after the merge returns
//!
//! Deletion-before-upsert means a record cannot be resurrected by a stale
//! upsert ordered after its own deletion in ambiguous server output. Merges
//! are idempotent: replaying an already-applied response changes nothing.

use crate::{error::Result, Collection, Error, Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A deletion entry in a delta response or deletion event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedRecord {
    pub id: RecordId,
}

impl DeletedRecord {
    /// Parse a deletion out of a push-event payload, which carries `{id}`.
    pub fn from_event_payload(payload: serde_json::Value) -> Result<Self> {
        let value: DeletedRecord =
            serde_json::from_value(payload).map_err(|_| Error::MissingField("id"))?;
        Ok(value)
    }
}

/// One delta-endpoint response: everything that changed since `since`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Records created or updated since the requested checkpoint
    pub updated_records: Vec<Record>,
    /// Records deleted since the requested checkpoint
    pub deleted_records: Vec<DeletedRecord>,
    /// Server timestamp to advance the checkpoint to after merging
    pub current_timestamp: Timestamp,
}

impl ChangeSet {
    /// Whether the response carries no changes.
    pub fn is_empty(&self) -> bool {
        self.updated_records.is_empty() && self.deleted_records.is_empty()
    }

    /// Merge this response into the local collection.
    ///
    /// Deletions first, then upserts; an upsert whose id appears in this
    /// response's deletion list is dropped. Stale upserts (version lower
    /// than the resident record) are dropped by the collection guard.
    pub fn merge_into(&self, collection: &mut Collection) -> MergeSummary {
        let mut summary = MergeSummary::default();

        let mut tombstones: HashSet<&str> = HashSet::with_capacity(self.deleted_records.len());
        for deleted in &self.deleted_records {
            tombstones.insert(deleted.id.as_str());
            if collection.remove(&deleted.id).is_some() {
                summary.deleted += 1;
            }
        }

        for record in &self.updated_records {
            if tombstones.contains(record.id.as_str()) {
                summary.skipped += 1;
                continue;
            }
            if collection.upsert(record.clone()) {
                summary.upserted += 1;
            } else {
                summary.skipped += 1;
            }
        }

        summary
    }
}

/// Counts of what one merge actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records inserted or replaced
    pub upserted: usize,
    /// Records removed
    pub deleted: usize,
    /// Upserts dropped as stale or tombstoned within the response
    pub skipped: usize,
}

impl MergeSummary {
    /// Whether the merge left the collection untouched.
    pub fn is_noop(&self) -> bool {
        self.upserted == 0 && self.deleted == 0
    }
}
