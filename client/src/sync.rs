//! Delta reconciliation against the remote authority.
//!
//! The coordinator owns the checkpoint: it fetches changes since the current
//! checkpoint, merges them (deletions before upserts) into the shared
//! collection, and only then advances and persists the checkpoint. A failed
//! fetch leaves the checkpoint untouched, so the same `since` is retried on
//! the next trigger. Triggers are connection events, a fixed interval while
//! connected, and push-event hints.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use tether_engine::{Checkpoint, Collection, DeletedRecord, MergeSummary, Record};

use crate::config::Config;
use crate::connection::ConnectionEvent;
use crate::dispatch::{EventDispatcher, Subscription};
use crate::error::Error;
use crate::now_millis;
use crate::protocol::{EVENT_RECORD_CREATED, EVENT_RECORD_DELETED, EVENT_RECORD_UPDATED};
use crate::storage::CheckpointStore;
use crate::transport::{Transport, TransportError};

/// Why [`SyncCoordinator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncExit {
    /// The delta endpoint rejected the session's credentials. The caller
    /// tears the session down.
    AuthExpired,
    /// The trigger sources are gone.
    Stopped,
}

/// Issues delta fetches and merges the results into the local collection.
pub struct SyncCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CheckpointStore>,
    collection: Arc<RwLock<Collection>>,
    config: Arc<Config>,
    checkpoint: Mutex<Checkpoint>,
    consecutive_failures: AtomicU32,
    hint_tx: mpsc::UnboundedSender<()>,
    hint_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SyncCoordinator {
    /// Create a coordinator, reading the persisted checkpoint. Without one
    /// (first run, or an unreadable value) the checkpoint starts at "now
    /// minus the lookback window" so history replay stays bounded.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CheckpointStore>,
        collection: Arc<RwLock<Collection>>,
        config: Arc<Config>,
    ) -> Self {
        let persisted = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "checkpoint load failed, starting from lookback window");
            None
        });
        let checkpoint = persisted.unwrap_or_else(|| {
            Checkpoint::starting_point(now_millis(), config.first_run_lookback.as_millis() as u64)
        });
        tracing::debug!(checkpoint = checkpoint.millis(), "sync coordinator ready");

        let (hint_tx, hint_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            store,
            collection,
            config,
            checkpoint: Mutex::new(checkpoint),
            consecutive_failures: AtomicU32::new(0),
            hint_tx,
            hint_rx: Mutex::new(Some(hint_rx)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Current checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        *self.checkpoint.lock()
    }

    /// Delta fetches failed in a row since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Ask the run loop for an opportunistic reconciliation.
    pub fn hint(&self) {
        let _ = self.hint_tx.send(());
    }

    /// One reconciliation pass with the current checkpoint as `since`.
    pub async fn reconcile(&self) -> Result<MergeSummary, Error> {
        let since = self.checkpoint();
        let response = match self.transport.fetch_changes(since).await {
            Ok(response) => response,
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    error = %e,
                    failures,
                    since = since.millis(),
                    "delta fetch failed, checkpoint untouched"
                );
                return Err(match e {
                    TransportError::AuthExpired => Error::AuthExpired,
                    other => Error::Sync(other.to_string()),
                });
            }
        };

        let summary = {
            let mut collection = self.collection.write();
            response.merge_into(&mut collection)
        };

        // The merge is complete; only now may the checkpoint move.
        let advanced = {
            let mut checkpoint = self.checkpoint.lock();
            checkpoint.advance(response.current_timestamp);
            *checkpoint
        };
        if let Err(e) = self.store.save(advanced) {
            tracing::warn!(error = %e, "checkpoint persist failed, next sync rewrites it");
        }
        self.consecutive_failures.store(0, Ordering::SeqCst);

        tracing::debug!(
            upserted = summary.upserted,
            deleted = summary.deleted,
            checkpoint = advanced.millis(),
            "reconciled"
        );
        Ok(summary)
    }

    /// Register push-event listeners: creation and update payloads are
    /// applied to the collection directly (version-guarded), deletions are
    /// removed, and every event doubles as a re-sync hint. The delta fetch
    /// stays the source of truth for anything an event got wrong.
    pub fn attach(&self, dispatcher: &EventDispatcher) {
        let mut subscriptions = Vec::with_capacity(3);

        for kind in [EVENT_RECORD_CREATED, EVENT_RECORD_UPDATED] {
            let collection = Arc::clone(&self.collection);
            let hint_tx = self.hint_tx.clone();
            subscriptions.push(dispatcher.register(kind, move |payload| {
                match Record::from_event_payload(payload.clone()) {
                    Ok(record) => {
                        collection.write().upsert(record);
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed record event"),
                }
                let _ = hint_tx.send(());
            }));
        }

        let collection = Arc::clone(&self.collection);
        let hint_tx = self.hint_tx.clone();
        subscriptions.push(dispatcher.register(EVENT_RECORD_DELETED, move |payload| {
            match DeletedRecord::from_event_payload(payload.clone()) {
                Ok(deleted) => {
                    collection.write().remove(&deleted.id);
                }
                Err(e) => tracing::warn!(error = %e, "ignoring malformed deletion event"),
            }
            let _ = hint_tx.send(());
        }));

        self.subscriptions.lock().extend(subscriptions);
    }

    /// Drop local state: empty the collection, remove the persisted
    /// checkpoint, and rewind the in-memory checkpoint to the lookback
    /// default. Used by session teardown.
    pub fn reset(&self) {
        self.collection.write().clear();
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "checkpoint clear failed");
        }
        *self.checkpoint.lock() = Checkpoint::starting_point(
            now_millis(),
            self.config.first_run_lookback.as_millis() as u64,
        );
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Trigger loop: reconcile on every (re)connection, on a fixed interval
    /// while connected, and on coalesced push-event hints. Returns when the
    /// session expires or every trigger source is gone.
    pub async fn run(&self, mut events: broadcast::Receiver<ConnectionEvent>) -> SyncExit {
        let mut hints = match self.hint_rx.lock().take() {
            Some(rx) => rx,
            None => {
                tracing::warn!("sync run loop already taken");
                return SyncExit::Stopped;
            }
        };

        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate first tick
        let mut connected = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(ConnectionEvent::Connected { reconnect }) => {
                        connected = true;
                        tracing::debug!(reconnect, "connection trigger");
                        if self.reconcile_swallowing(&mut hints).await == Some(SyncExit::AuthExpired) {
                            return SyncExit::AuthExpired;
                        }
                    }
                    Ok(ConnectionEvent::Dropped)
                    | Ok(ConnectionEvent::ReconnectsExhausted)
                    | Ok(ConnectionEvent::Disconnected) => {
                        connected = false;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "connection events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return SyncExit::Stopped,
                },
                _ = ticker.tick(), if connected => {
                    if self.reconcile_swallowing(&mut hints).await == Some(SyncExit::AuthExpired) {
                        return SyncExit::AuthExpired;
                    }
                }
                hint = hints.recv(), if connected => match hint {
                    Some(()) => {
                        if self.reconcile_swallowing(&mut hints).await == Some(SyncExit::AuthExpired) {
                            return SyncExit::AuthExpired;
                        }
                    }
                    None => return SyncExit::Stopped,
                },
            }
        }
    }

    /// Reconcile, swallowing transient failures (they are retried on the
    /// next trigger) and coalescing hints that piled up meanwhile.
    async fn reconcile_swallowing(
        &self,
        hints: &mut mpsc::UnboundedReceiver<()>,
    ) -> Option<SyncExit> {
        let outcome = self.reconcile().await;
        while hints.try_recv().is_ok() {}
        match outcome {
            Ok(_) => None,
            Err(Error::AuthExpired) => Some(SyncExit::AuthExpired),
            Err(_) => None,
        }
    }
}
