//! Optimistic-concurrency writes.
//!
//! Every mutation carries the version the writer last saw; the server
//! rejects a stale one with a conflict, which is surfaced as
//! [`Error::Conflict`] so callers can branch on it. Nothing here retries a
//! failed write: retrying is the caller's decision, a dispatched request may
//! already have applied.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use tether_engine::{Collection, Record, Version};

use crate::error::Error;
use crate::sync::SyncCoordinator;
use crate::transport::{Transport, TransportError};

/// Issues version-guarded mutations and folds accepted results into the
/// local collection.
pub struct WriteCoordinator {
    transport: Arc<dyn Transport>,
    collection: Arc<RwLock<Collection>>,
    sync: Option<Arc<SyncCoordinator>>,
}

impl WriteCoordinator {
    pub fn new(transport: Arc<dyn Transport>, collection: Arc<RwLock<Collection>>) -> Self {
        Self {
            transport,
            collection,
            sync: None,
        }
    }

    /// Nudge the sync coordinator after each accepted write, catching
    /// anything a concurrent writer changed around it.
    pub fn with_sync_hints(mut self, sync: Arc<SyncCoordinator>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Create a record. The server assigns id and version.
    pub async fn create(&self, fields: Value) -> Result<Record, Error> {
        match self.transport.create_record(fields).await {
            Ok(record) => {
                tracing::debug!(id = %record.id, "record created");
                self.collection.write().upsert(record.clone());
                self.after_write();
                Ok(record)
            }
            Err(TransportError::Conflict) => {
                // No version was asserted, so this is an input problem.
                Err(Error::Validation("record already exists".to_string()))
            }
            Err(e) => Err(self.surface(Self::classify_other(e))),
        }
    }

    /// Patch a record, asserting `expected_version`. On acceptance the
    /// server returns the whole record at its incremented version.
    pub async fn update(
        &self,
        id: &str,
        patch: Value,
        expected_version: Version,
    ) -> Result<Record, Error> {
        match self
            .transport
            .update_record(id, patch, expected_version)
            .await
        {
            Ok(record) => {
                tracing::debug!(id = %record.id, version = record.version, "record updated");
                self.collection.write().upsert(record.clone());
                self.after_write();
                Ok(record)
            }
            Err(e) => Err(self.surface(Self::classify(e, id, expected_version))),
        }
    }

    /// Delete a record, asserting `expected_version`.
    pub async fn delete(&self, id: &str, expected_version: Version) -> Result<(), Error> {
        match self.transport.delete_record(id, expected_version).await {
            Ok(()) => {
                tracing::debug!(id, "record deleted");
                self.collection.write().remove(id);
                self.after_write();
                Ok(())
            }
            Err(e) => Err(self.surface(Self::classify(e, id, expected_version))),
        }
    }

    fn after_write(&self) {
        if let Some(sync) = &self.sync {
            sync.hint();
        }
    }

    /// Auth expiry on a write also nudges the sync loop, which confirms the
    /// expiry against the delta endpoint and tears the session down.
    fn surface(&self, error: Error) -> Error {
        if matches!(error, Error::AuthExpired) {
            self.after_write();
        }
        error
    }

    fn classify(error: TransportError, id: &str, submitted: Version) -> Error {
        match error {
            TransportError::Conflict => Error::Conflict {
                id: id.to_string(),
                submitted,
            },
            other => Self::classify_other(other),
        }
    }

    fn classify_other(error: TransportError) -> Error {
        match error {
            TransportError::Validation(msg) => Error::Validation(msg),
            TransportError::AuthExpired => Error::AuthExpired,
            TransportError::Network(msg) | TransportError::Server(msg) => Error::Connection(msg),
            // classify() already peeled conflicts off.
            TransportError::Conflict => Error::Validation("unexpected conflict".to_string()),
        }
    }
}
