//! Unified error handling for the sync client.
//!
//! Propagation policy: connection and sync failures recover locally
//! (backoff, next trigger) and are not surfaced per attempt; write failures
//! always reach the caller with conflicts distinguishable from everything
//! else; session expiry tears the whole client down.

use tether_engine::{RecordId, Version};

/// Client error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient channel or network failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Another writer changed the record since `submitted` was read.
    /// Presentable as "someone else changed this, refresh and retry".
    #[error("conflict on record {id}: submitted version {submitted} is stale")]
    Conflict { id: RecordId, submitted: Version },

    /// The server rejected the input. Surface to the user as-is.
    #[error("validation rejected: {0}")]
    Validation(String),

    /// Credentials expired. Triggers full session teardown.
    #[error("session expired")]
    AuthExpired,

    /// Delta fetch failure. The checkpoint stays untouched and the fetch is
    /// retried on the next trigger.
    #[error("delta sync failed: {0}")]
    Sync(String),

    /// Checkpoint persistence failure.
    #[error("checkpoint storage: {0}")]
    Storage(String),
}

impl Error {
    /// Whether this is a write conflict callers should branch on.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
