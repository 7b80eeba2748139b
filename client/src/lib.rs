//! # Tether Client
//!
//! Client-side state synchronization over an unreliable network.
//!
//! The crate keeps a local copy of a shared, concurrently-edited record
//! collection consistent with a remote authority by combining:
//!
//! - a persistent websocket channel for low-latency push notifications
//!   ([`ConnectionManager`]),
//! - timestamp-based delta reconciliation that repairs state after
//!   disconnects or missed events ([`SyncCoordinator`]),
//! - optimistic-concurrency writes that surface conflicts distinctly
//!   ([`WriteCoordinator`]),
//! - and a session-expiry monitor that coordinates teardown
//!   ([`SessionLifecycleMonitor`]).
//!
//! [`SyncClient`] wires the pieces into one explicitly owned service with an
//! `init()`/`teardown()` lifecycle. Nothing in this crate is a global.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod write;

pub use client::SyncClient;
pub use config::{Config, ConfigError};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use dispatch::{EventDispatcher, Subscription};
pub use error::Error;
pub use protocol::{SubscriptionTopic, TopicKind};
pub use session::{SessionLifecycleMonitor, SessionProvider};
pub use storage::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use sync::SyncCoordinator;
pub use transport::{HttpTransport, Transport, TransportError};
pub use write::WriteCoordinator;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_millis() -> tether_engine::Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
