//! Session lifecycle: expiry tracking, throttled refresh, teardown.
//!
//! Exactly one timer is armed for the current expiry; every successful
//! refresh re-arms it. Teardown runs each step regardless of how the
//! previous one fared: leave the per-identity topic, disconnect the
//! channel, clear checkpoint and collection, cancel timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use tether_engine::Timestamp;

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::Error;
use crate::now_millis;
use crate::protocol::SubscriptionTopic;
use crate::sync::SyncCoordinator;

/// Credential/session collaborator.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The authenticated identity, used to name the per-identity topic.
    fn identity(&self) -> String;

    /// Refresh the credentials. Returns the new expiry in milliseconds
    /// since the epoch.
    async fn refresh(&self) -> Result<Timestamp, Error>;
}

struct Inner {
    provider: Arc<dyn SessionProvider>,
    connection: ConnectionManager,
    sync: Arc<SyncCoordinator>,
    config: Arc<Config>,
    expiry_timer: Mutex<Option<JoinHandle<()>>>,
    last_refresh: Mutex<Option<tokio::time::Instant>>,
    authenticated: AtomicBool,
    tearing_down: AtomicBool,
}

/// Tracks credential expiry and orchestrates teardown. Cheap to clone.
#[derive(Clone)]
pub struct SessionLifecycleMonitor {
    inner: Arc<Inner>,
}

impl SessionLifecycleMonitor {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        connection: ConnectionManager,
        sync: Arc<SyncCoordinator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                connection,
                sync,
                config,
                expiry_timer: Mutex::new(None),
                last_refresh: Mutex::new(None),
                authenticated: AtomicBool::new(false),
                tearing_down: AtomicBool::new(false),
            }),
        }
    }

    /// The authenticated identity.
    pub fn identity(&self) -> String {
        self.inner.provider.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// Track a new expiry timestamp. Cancels the previous expiry timer and
    /// arms exactly one for this expiry.
    pub fn set_expiry(&self, expiry: Timestamp) {
        self.inner.tearing_down.store(false, Ordering::SeqCst);
        self.inner.authenticated.store(true, Ordering::SeqCst);

        let delay = Duration::from_millis(expiry.saturating_sub(now_millis()));
        tracing::debug!(expiry, delay_ms = delay.as_millis() as u64, "expiry timer armed");

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("session expired, tearing down");
            monitor.teardown();
        });

        let previous = self.inner.expiry_timer.lock().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Activity signal. May refresh the session, throttled to once per
    /// configured interval, and only while authenticated and not
    /// mid-teardown.
    pub async fn on_activity(&self) {
        if !self.is_authenticated() || self.inner.tearing_down.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut last = self.inner.last_refresh.lock();
            let now = tokio::time::Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.inner.config.refresh_throttle {
                    return;
                }
            }
            // Claim the slot before awaiting so concurrent signals coalesce.
            *last = Some(now);
        }

        match self.inner.provider.refresh().await {
            Ok(expiry) => {
                tracing::debug!(expiry, "session refreshed");
                self.set_expiry(expiry);
            }
            Err(Error::AuthExpired) => {
                tracing::warn!("refresh rejected, session expired");
                self.teardown();
            }
            Err(e) => {
                tracing::warn!(error = %e, "session refresh failed");
            }
        }
    }

    /// Tear the session down. Idempotent; every step is best-effort and
    /// runs regardless of the previous step's outcome.
    pub fn teardown(&self) {
        if self.inner.tearing_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.authenticated.store(false, Ordering::SeqCst);

        let topic = SubscriptionTopic::per_identity(&self.inner.provider.identity());
        self.inner.connection.leave(&topic);

        self.inner.connection.disconnect();

        self.inner.sync.reset();

        if let Some(timer) = self.inner.expiry_timer.lock().take() {
            timer.abort();
        }

        tracing::info!("session teardown complete");
    }
}
