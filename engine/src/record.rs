//! Record types for the synced collection.

use crate::{error::Result, Error, RecordId, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// A shared record as the server publishes it.
///
/// The version is the optimistic-concurrency token: the server increments it
/// on every accepted write, and a writer carrying a stale version is
/// rejected with a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier for this record
    pub id: RecordId,
    /// The data payload (JSON object)
    pub fields: serde_json::Value,
    /// Identity that created the record
    pub owner: String,
    /// Identity that produced the current version
    pub last_editor: String,
    /// Version number, incremented by the server on each accepted write
    pub version: Version,
    /// Ids of related entities
    #[serde(default)]
    pub related: Vec<RecordId>,
    /// When the record was first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the record was last updated (milliseconds since epoch)
    pub updated_at: Timestamp,
}

impl Record {
    /// Create a new record at version 1, owned and last edited by `owner`.
    pub fn new(
        id: impl Into<RecordId>,
        fields: serde_json::Value,
        owner: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        let owner = owner.into();
        Self {
            id: id.into(),
            fields,
            last_editor: owner.clone(),
            owner,
            version: 1,
            related: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Builder: set the version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Builder: set related entity ids.
    pub fn with_related(mut self, related: Vec<RecordId>) -> Self {
        self.related = related;
        self
    }

    /// Parse a record out of a push-event payload.
    ///
    /// Creation and update events carry the full record as their payload.
    pub fn from_event_payload(payload: serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record() {
        let record = Record::new("list-1", json!({"title": "Groceries"}), "ana", 1000);

        assert_eq!(record.id, "list-1");
        assert_eq!(record.version, 1);
        assert_eq!(record.owner, "ana");
        assert_eq!(record.last_editor, "ana");
        assert_eq!(record.created_at, 1000);
        assert_eq!(record.updated_at, 1000);
        assert!(record.related.is_empty());
    }

    #[test]
    fn builders() {
        let record = Record::new("list-1", json!({}), "ana", 1000)
            .with_version(4)
            .with_related(vec!["item-1".into(), "item-2".into()]);

        assert_eq!(record.version, 4);
        assert_eq!(record.related.len(), 2);
    }

    #[test]
    fn serialization_roundtrip() {
        let record = Record::new("list-1", json!({"title": "Groceries", "done": false}), "ana", 1000)
            .with_version(3);

        let json = serde_json::to_string(&record).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();

        assert_eq!(record, parsed);
    }

    #[test]
    fn serialization_format() {
        let record = Record::new("list-1", json!({}), "ana", 1000);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("lastEditor")); // camelCase
        assert!(json.contains("createdAt"));
        assert!(json.contains("updatedAt"));
    }

    #[test]
    fn from_event_payload_full_record() {
        let payload = json!({
            "id": "list-1",
            "fields": {"title": "Groceries"},
            "owner": "ana",
            "lastEditor": "ben",
            "version": 2,
            "createdAt": 1000,
            "updatedAt": 2000
        });

        let record = Record::from_event_payload(payload).unwrap();
        assert_eq!(record.id, "list-1");
        assert_eq!(record.version, 2);
        assert_eq!(record.last_editor, "ben");
        // `related` may be omitted on the wire
        assert!(record.related.is_empty());
    }

    #[test]
    fn from_event_payload_rejects_garbage() {
        let err = Record::from_event_payload(json!("not an object")).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }
}
