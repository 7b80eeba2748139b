//! Persistent channel lifecycle.
//!
//! Owns the websocket connection: the connect/reconnect state machine,
//! exponential backoff, keepalives, and topic subscriptions. Inbound events
//! are handed to the [`EventDispatcher`]; lifecycle transitions are published
//! on a broadcast channel for the sync coordinator and session monitor.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Config;
use crate::dispatch::EventDispatcher;
use crate::protocol::{ChannelEnvelope, ClientFrame, SubscriptionTopic};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsReader = futures::stream::SplitStream<WsStream>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Lifecycle transitions observable by other components.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Channel is up and subscriptions are flushed.
    Connected { reconnect: bool },
    /// Channel dropped unexpectedly; reconnection is underway.
    Dropped,
    /// Every reconnection attempt failed. The channel stays down until the
    /// owner calls `connect()` again.
    ReconnectsExhausted,
    /// Intentional disconnect completed.
    Disconnected,
}

/// Backoff delay for reconnect attempt `n` (1-based): `base * 2^(n-1)`,
/// capped at `cap`.
pub(crate) fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}

struct Inner {
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    state: Mutex<ConnectionState>,
    /// Consecutive failed attempts; reset to zero by any successful connect.
    attempt: AtomicU32,
    /// Topics waiting for a connection.
    pending: Mutex<Vec<SubscriptionTopic>>,
    /// Topics live on the current connection, re-joined after reconnects.
    joined: Mutex<Vec<SubscriptionTopic>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    events: broadcast::Sender<ConnectionEvent>,
    visible: watch::Sender<bool>,
    /// Set while disconnect() runs so the reader does not treat the close
    /// as an unexpected drop.
    closing: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Manages the persistent channel. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: Arc<Config>, dispatcher: Arc<EventDispatcher>) -> Self {
        let (events, _) = broadcast::channel(32);
        let (visible, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                state: Mutex::new(ConnectionState::Disconnected),
                attempt: AtomicU32::new(0),
                pending: Mutex::new(Vec::new()),
                joined: Mutex::new(Vec::new()),
                outgoing: Mutex::new(None),
                events,
                visible,
                closing: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Consecutive failed reconnect attempts so far.
    pub fn attempts(&self) -> u32 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Number of topics queued for join once a connection exists.
    pub fn pending_subscriptions(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Pause or resume keepalives as the hosting surface goes out of and
    /// back into view. The channel itself stays up either way.
    pub fn set_visible(&self, visible: bool) {
        self.inner.visible.send_replace(visible);
    }

    /// Open the channel. A no-op unless currently Disconnected, so a client
    /// instance never holds more than one connection.
    ///
    /// Failures are not surfaced per attempt: the manager keeps retrying
    /// with exponential backoff and reports the outcome through
    /// [`ConnectionEvent`]s.
    pub async fn connect(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Disconnected {
                tracing::debug!(state = ?*state, "connect ignored, channel already active");
                return;
            }
            *state = ConnectionState::Connecting;
        }
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.attempt.store(0, Ordering::SeqCst);

        if let Err(e) = self.establish().await {
            tracing::warn!(error = %e, "initial connect failed, scheduling retries");
            *self.inner.state.lock() = ConnectionState::Reconnecting;
            self.begin_reconnect();
        }
    }

    /// Subscribe to a topic. Joins immediately while connected, otherwise
    /// queues the join until a connection exists.
    pub fn join(&self, topic: SubscriptionTopic) {
        if self.state() == ConnectionState::Connected {
            {
                let mut joined = self.inner.joined.lock();
                if !joined.contains(&topic) {
                    joined.push(topic.clone());
                }
            }
            tracing::debug!(topic = %topic.name, "join");
            self.send_frame(&ClientFrame::Join { topic: topic.name });
        } else {
            let mut pending = self.inner.pending.lock();
            if !pending.contains(&topic) {
                tracing::debug!(topic = %topic.name, "join queued until connected");
                pending.push(topic);
            }
        }
    }

    /// Unsubscribe from a topic. A no-op if not connected, beyond clearing
    /// any queued join.
    pub fn leave(&self, topic: &SubscriptionTopic) {
        self.inner.pending.lock().retain(|t| t != topic);
        self.inner.joined.lock().retain(|t| t != topic);
        if self.state() == ConnectionState::Connected {
            tracing::debug!(topic = %topic.name, "leave");
            self.send_frame(&ClientFrame::Leave {
                topic: topic.name.clone(),
            });
        }
    }

    /// Close the channel intentionally. Cancels scheduled reconnects and
    /// keepalives; does not touch queued subscriptions.
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnecting;
        }
        self.inner.closing.store(true, Ordering::SeqCst);

        // Stop the reader, heartbeat, and any scheduled reconnect before
        // closing the socket, so the close is not seen as a drop.
        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }

        if let Some(tx) = self.inner.outgoing.lock().take() {
            let _ = tx.send(Message::Close(None));
            // Dropping the sender lets the writer flush the close and exit.
        }

        self.inner.attempt.store(0, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Disconnected;
        tracing::info!("channel disconnected");
        let _ = self.inner.events.send(ConnectionEvent::Disconnected);
    }

    /// One connect attempt plus post-connect setup.
    async fn establish(&self) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (ws, _) =
            tokio_tungstenite::connect_async(self.inner.config.channel_url.as_str()).await?;
        if self.inner.closing.load(Ordering::SeqCst) {
            // disconnect() won the race; dropping the socket closes it.
            return Ok(());
        }
        let (mut ws_tx, ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        // Writer: drains the outgoing queue until every sender is gone.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let reconnect = self.inner.attempt.swap(0, Ordering::SeqCst) > 0;
        let heartbeat_tx = out_tx.clone();
        *self.inner.outgoing.lock() = Some(out_tx);
        *self.inner.state.lock() = ConnectionState::Connected;

        // Queued joins become live subscriptions; previously live topics are
        // re-joined after a reconnect.
        let topics: Vec<SubscriptionTopic> = {
            let mut joined = self.inner.joined.lock();
            let mut pending = self.inner.pending.lock();
            for topic in pending.drain(..) {
                if !joined.contains(&topic) {
                    joined.push(topic);
                }
            }
            joined.clone()
        };
        for topic in &topics {
            self.send_frame(&ClientFrame::Join {
                topic: topic.name.clone(),
            });
            tracing::debug!(topic = %topic.name, "joined topic");
        }

        {
            let mut tasks = self.inner.tasks.lock();
            tasks.retain(|t| !t.is_finished());
            let manager = self.clone();
            tasks.push(tokio::spawn(async move {
                manager.heartbeat_loop(heartbeat_tx).await
            }));
            let manager = self.clone();
            tasks.push(tokio::spawn(async move { manager.read_loop(ws_rx).await }));
        }

        tracing::info!(reconnect, "channel connected");
        let _ = self.inner.events.send(ConnectionEvent::Connected { reconnect });
        Ok(())
    }

    async fn read_loop(self, mut ws_rx: WsReader) {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ChannelEnvelope>(&text) {
                    Ok(envelope) if envelope.is_heartbeat() => {
                        tracing::trace!("server heartbeat");
                    }
                    Ok(envelope) => {
                        tracing::debug!(kind = %envelope.kind, "channel event");
                        self.inner
                            .dispatcher
                            .deliver(&envelope.kind, &envelope.payload);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable channel message");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        self.handle_drop();
    }

    /// Unexpected drop from the peer or transport.
    fn handle_drop(&self) {
        if self.inner.closing.load(Ordering::SeqCst) {
            return;
        }
        *self.inner.outgoing.lock() = None;
        *self.inner.state.lock() = ConnectionState::Reconnecting;
        tracing::warn!("channel dropped unexpectedly, reconnecting");
        let _ = self.inner.events.send(ConnectionEvent::Dropped);
        self.begin_reconnect();
    }

    fn begin_reconnect(&self) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                if manager.inner.closing.load(Ordering::SeqCst) {
                    return;
                }
                let attempt = manager.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > manager.inner.config.max_reconnect_attempts {
                    tracing::warn!(
                        attempts = attempt - 1,
                        "reconnection attempts exhausted, channel stays down"
                    );
                    *manager.inner.state.lock() = ConnectionState::Disconnected;
                    let _ = manager.inner.events.send(ConnectionEvent::ReconnectsExhausted);
                    return;
                }

                let delay = backoff_delay(
                    manager.inner.config.reconnect_base_delay,
                    manager.inner.config.reconnect_max_delay,
                    attempt,
                );
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                tokio::time::sleep(delay).await;

                if manager.inner.closing.load(Ordering::SeqCst) {
                    return;
                }
                match manager.establish().await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::debug!(attempt, error = %e, "reconnect attempt failed");
                    }
                }
            }
        });
        self.inner.tasks.lock().push(handle);
    }

    /// Keepalive loop bound to one connection: `out` is that connection's
    /// writer queue, so the loop ends when the connection does.
    async fn heartbeat_loop(self, out: mpsc::UnboundedSender<Message>) {
        let mut visible = self.inner.visible.subscribe();
        let mut ticker = tokio::time::interval(self.inner.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; the first keepalive waits a full period.
        ticker.tick().await;

        loop {
            if !*visible.borrow() {
                // Suspended while hidden. The channel stays up.
                if visible.changed().await.is_err() {
                    return;
                }
                continue;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if !*visible.borrow() {
                        continue;
                    }
                    let Ok(text) = serde_json::to_string(&ClientFrame::Heartbeat) else {
                        continue;
                    };
                    if out.send(Message::Text(text)).is_err() {
                        return;
                    }
                }
                changed = visible.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn send_frame(&self, frame: &ClientFrame) {
        let Ok(text) = serde_json::to_string(frame) else {
            return;
        };
        if let Some(tx) = self.inner.outgoing.lock().as_ref() {
            let _ = tx.send(Message::Text(text));
        }
    }
}
