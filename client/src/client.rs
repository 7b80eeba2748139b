//! Top-level sync client: one explicitly owned service wiring the channel,
//! the coordinators, and the session monitor together.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use tether_engine::{Collection, Record};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::dispatch::EventDispatcher;
use crate::protocol::SubscriptionTopic;
use crate::session::{SessionLifecycleMonitor, SessionProvider};
use crate::storage::{CheckpointStore, FileCheckpointStore};
use crate::sync::{SyncCoordinator, SyncExit};
use crate::transport::{HttpTransport, Transport};
use crate::write::WriteCoordinator;

/// The sync client.
///
/// Owns every moving part; construct it, call [`SyncClient::init`], and read
/// records through [`SyncClient::records`]. There is no global state: two
/// clients in one process are fully independent.
pub struct SyncClient {
    /// Identifies this client instance in logs.
    instance: uuid::Uuid,
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    connection: ConnectionManager,
    collection: Arc<RwLock<Collection>>,
    sync: Arc<SyncCoordinator>,
    writes: WriteCoordinator,
    session: SessionLifecycleMonitor,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    /// Assemble a client from its collaborators.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CheckpointStore>,
        provider: Arc<dyn SessionProvider>,
    ) -> Self {
        let config = Arc::new(config);
        let dispatcher = Arc::new(EventDispatcher::new());
        let connection = ConnectionManager::new(Arc::clone(&config), Arc::clone(&dispatcher));
        let collection = Arc::new(RwLock::new(Collection::new()));

        let sync = Arc::new(SyncCoordinator::new(
            Arc::clone(&transport),
            store,
            Arc::clone(&collection),
            Arc::clone(&config),
        ));
        sync.attach(&dispatcher);

        let writes = WriteCoordinator::new(transport, Arc::clone(&collection))
            .with_sync_hints(Arc::clone(&sync));

        let session = SessionLifecycleMonitor::new(
            provider,
            connection.clone(),
            Arc::clone(&sync),
            Arc::clone(&config),
        );

        Self {
            instance: uuid::Uuid::new_v4(),
            config,
            dispatcher,
            connection,
            collection,
            sync,
            writes,
            session,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Assemble a client with the production HTTP transport and file-backed
    /// checkpoint storage.
    pub fn with_http_transport(
        config: Config,
        provider: Arc<dyn SessionProvider>,
        checkpoint_path: impl Into<PathBuf>,
    ) -> Self {
        let transport = Arc::new(HttpTransport::new(&config.api_url));
        let store = Arc::new(FileCheckpointStore::new(checkpoint_path));
        Self::new(config, transport, store, provider)
    }

    /// Start the client: queue the global and per-identity topic joins,
    /// start the reconciliation loop, and open the channel. Connection
    /// failures are recovered internally with backoff.
    pub async fn init(&self) {
        tracing::info!(instance = %self.instance, identity = %self.session.identity(), "client starting");
        self.connection
            .join(SubscriptionTopic::global(&self.config.global_topic));
        self.connection
            .join(SubscriptionTopic::per_identity(&self.session.identity()));

        let sync = Arc::clone(&self.sync);
        let session = self.session.clone();
        let events = self.connection.subscribe_events();
        self.tasks.lock().push(tokio::spawn(async move {
            if sync.run(events).await == SyncExit::AuthExpired {
                session.teardown();
            }
        }));

        self.connection.connect().await;
    }

    /// Tear the client down: session teardown (leave, disconnect, clear
    /// state, cancel timers) plus stopping the reconciliation loop.
    pub fn teardown(&self) {
        tracing::info!(instance = %self.instance, "client teardown");
        self.session.teardown();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Snapshot of every local record.
    pub fn records(&self) -> Vec<Record> {
        self.collection.read().records().cloned().collect()
    }

    /// Snapshot of one record.
    pub fn record(&self, id: &str) -> Option<Record> {
        self.collection.read().get(id).cloned()
    }

    /// Version-guarded mutations.
    pub fn writes(&self) -> &WriteCoordinator {
        &self.writes
    }

    /// Channel lifecycle and visibility control.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Reconciliation state (checkpoint, failure counter, manual trigger).
    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Session expiry and refresh.
    pub fn session(&self) -> &SessionLifecycleMonitor {
        &self.session
    }

    /// Listener registration for inbound channel events.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}
