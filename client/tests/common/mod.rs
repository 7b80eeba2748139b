//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use tether_client::error::Error;
use tether_client::session::SessionProvider;
use tether_client::transport::{Transport, TransportError};
use tether_engine::{ChangeSet, Checkpoint, Record, Timestamp, Version};

/// Opt-in test logging: `RUST_LOG=tether_client=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Deterministic record helper: fields derive from (id, version).
pub fn record(id: &str, version: u64) -> Record {
    Record::new(id, json!({"n": version}), "ana", 1000).with_version(version)
}

/// Transport double with scripted responses per endpoint.
///
/// An exhausted delta script answers an empty changeset so background sync
/// loops stay quiet instead of erroring.
#[derive(Default)]
pub struct MockTransport {
    pub deltas: Mutex<VecDeque<Result<ChangeSet, TransportError>>>,
    pub creates: Mutex<VecDeque<Result<Record, TransportError>>>,
    pub updates: Mutex<VecDeque<Result<Record, TransportError>>>,
    pub deletes: Mutex<VecDeque<Result<(), TransportError>>>,
    pub fetches: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_delta(&self, response: Result<ChangeSet, TransportError>) {
        self.deltas.lock().push_back(response);
    }

    pub fn script_update(&self, response: Result<Record, TransportError>) {
        self.updates.lock().push_back(response);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_changes(&self, since: Checkpoint) -> Result<ChangeSet, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.deltas.lock().pop_front().unwrap_or(Ok(ChangeSet {
            updated_records: vec![],
            deleted_records: vec![],
            current_timestamp: since.millis(),
        }))
    }

    async fn create_record(&self, _fields: Value) -> Result<Record, TransportError> {
        self.creates
            .lock()
            .pop_front()
            .unwrap_or(Err(TransportError::Network("create script exhausted".into())))
    }

    async fn update_record(
        &self,
        _id: &str,
        _patch: Value,
        _expected_version: Version,
    ) -> Result<Record, TransportError> {
        self.updates
            .lock()
            .pop_front()
            .unwrap_or(Err(TransportError::Network("update script exhausted".into())))
    }

    async fn delete_record(
        &self,
        _id: &str,
        _expected_version: Version,
    ) -> Result<(), TransportError> {
        self.deletes
            .lock()
            .pop_front()
            .unwrap_or(Err(TransportError::Network("delete script exhausted".into())))
    }
}

/// Session provider double with a fixed identity and scripted expiries.
pub struct StubProvider {
    identity: String,
    refreshes: AtomicU32,
    next_expiry: Mutex<Timestamp>,
}

impl StubProvider {
    pub fn new(identity: &str, next_expiry: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
            refreshes: AtomicU32::new(0),
            next_expiry: Mutex::new(next_expiry),
        })
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for StubProvider {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn refresh(&self) -> Result<Timestamp, Error> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(*self.next_expiry.lock())
    }
}
