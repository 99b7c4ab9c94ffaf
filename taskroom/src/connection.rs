//! Connection lifecycle management for the sync channel.
//!
//! [`ConnectionManager`] owns exactly one live connection per session
//! credential. A background supervisor task negotiates the transport,
//! decodes inbound frames, forwards outbound events, and drives
//! reconnection on a fixed-delay, fixed-budget policy. The owner observes
//! everything through [`Signal`]s and the shared connection state; network
//! failures never surface as errors from this module's public methods.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskroom_proto::codec;
use taskroom_proto::event::{ClientEvent, ServerEvent};

use crate::config::RetryPolicy;
use crate::transport::{Transport, TransportKind, negotiate};

/// Lifecycle state of the sync connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and none being attempted.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// The connection is live.
    Connected,
    /// The last connect attempt failed; see the stored error.
    Errored,
}

/// Notifications emitted by the connection supervisor.
#[derive(Debug)]
pub enum Signal {
    /// A connection was established.
    Up {
        /// Which transport won negotiation.
        kind: TransportKind,
    },
    /// The live connection dropped. Room context does not survive this.
    Down {
        /// Human-readable cause.
        reason: String,
    },
    /// A connect attempt failed; more may follow.
    ConnectError {
        /// Human-readable cause.
        message: String,
        /// 1-based attempt number within the current outage.
        attempt: u32,
    },
    /// The retry budget for the current outage is exhausted.
    GaveUp,
    /// A server event arrived on the live connection.
    Push(ServerEvent),
}

/// Parameters for establishing and supervising a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Sync server HTTP base URL.
    pub server_url: String,
    /// Handshake ceiling for one connect attempt.
    pub connect_timeout: Duration,
    /// Reconnection policy.
    pub retry: RetryPolicy,
    /// Capacity of the signal and outbound channels.
    pub channel_capacity: usize,
    /// How long the server may hold a long-poll request.
    pub poll_wait: Duration,
}

/// Connection state shared between the supervisor and its owner.
pub(crate) struct ConnShared {
    state: Mutex<ConnectionState>,
    last_error: Mutex<Option<String>>,
}

impl ConnShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }
}

/// Owns one live sync connection and its supervisor task.
///
/// Created via [`ConnectionManager::connect`]; torn down explicitly with
/// [`teardown`](Self::teardown) or implicitly on drop. The owner must
/// tear an old manager down before creating a new one for a changed
/// credential — two live connections for one logical session must never
/// exist.
pub struct ConnectionManager {
    shared: Arc<ConnShared>,
    outbound_tx: mpsc::Sender<ClientEvent>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    /// Start a supervised connection using the given credential.
    ///
    /// Returns `None` without any network activity when the token is
    /// empty or whitespace — an unauthenticated session never attempts a
    /// connection. Otherwise returns the manager and the receiver for its
    /// [`Signal`]s.
    #[must_use]
    pub fn connect(token: &str, config: ConnectionConfig) -> Option<(Self, mpsc::Receiver<Signal>)> {
        if token.trim().is_empty() {
            tracing::debug!("no token available, skipping connection");
            return None;
        }

        let shared = Arc::new(ConnShared::new());
        let (signal_tx, signal_rx) = mpsc::channel(config.channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_capacity);

        let supervisor = tokio::spawn(supervise(
            token.to_string(),
            config,
            Arc::clone(&shared),
            signal_tx,
            outbound_rx,
        ));

        Some((
            Self {
                shared,
                outbound_tx,
                supervisor,
            },
            signal_rx,
        ))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Last connection or protocol error, cleared on successful (re)connect.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Queue an event for the server.
    ///
    /// Returns `false` without queuing when the connection is not
    /// currently live; callers treat that as a silent no-op.
    pub async fn send(&self, event: ClientEvent) -> bool {
        if self.state() != ConnectionState::Connected {
            tracing::debug!(?event, "dropping outbound event, not connected");
            return false;
        }
        self.outbound_tx.send(event).await.is_ok()
    }

    /// Close the connection and stop the supervisor.
    ///
    /// Idempotent. Dropping the transport inside the aborted supervisor
    /// closes the underlying socket or polling session.
    pub fn teardown(&self) {
        self.supervisor.abort();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub(crate) fn shared_handle(&self) -> Arc<ConnShared> {
        Arc::clone(&self.shared)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Supervisor task: connect, pump frames, reconnect on drop.
async fn supervise(
    token: String,
    config: ConnectionConfig,
    shared: Arc<ConnShared>,
    signal_tx: mpsc::Sender<Signal>,
    mut outbound_rx: mpsc::Receiver<ClientEvent>,
) {
    'outage: loop {
        // Connect phase: fixed budget of attempts, fixed delay between them.
        let mut link = None;
        for attempt in 1..=config.retry.max_attempts {
            shared.set_state(ConnectionState::Connecting);
            match negotiate(
                &config.server_url,
                &token,
                config.connect_timeout,
                config.poll_wait,
            )
            .await
            {
                Ok(transport) => {
                    let kind = transport.kind();
                    shared.set_state(ConnectionState::Connected);
                    shared.clear_error();
                    tracing::info!(%kind, attempt, "sync connection established");
                    if signal_tx.send(Signal::Up { kind }).await.is_err() {
                        return;
                    }
                    link = Some(transport);
                    break;
                }
                Err(e) => {
                    let message = e.to_string();
                    shared.record_error(message.clone());
                    shared.set_state(ConnectionState::Errored);
                    tracing::warn!(attempt, err = %message, "connect attempt failed");
                    if signal_tx
                        .send(Signal::ConnectError { message, attempt })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    if attempt < config.retry.max_attempts {
                        tokio::time::sleep(config.retry.delay).await;
                    }
                }
            }
        }

        let Some(link) = link else {
            shared.set_state(ConnectionState::Disconnected);
            tracing::warn!(
                attempts = config.retry.max_attempts,
                "retry budget exhausted, giving up"
            );
            let _ = signal_tx.send(Signal::GaveUp).await;
            return;
        };

        // Connected phase: pump frames both ways until the link drops.
        loop {
            tokio::select! {
                frame = Box::pin(link.recv()) => match frame {
                    Ok(text) => match codec::decode_server(&text) {
                        Ok(event) => {
                            if signal_tx.send(Signal::Push(event)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            // Malformed frame: log and skip, don't disconnect.
                            tracing::warn!(err = %e, "malformed server frame, skipping");
                        }
                    },
                    Err(e) => {
                        let reason = e.to_string();
                        shared.set_state(ConnectionState::Disconnected);
                        tracing::info!(reason = %reason, "sync connection dropped");
                        if signal_tx.send(Signal::Down { reason }).await.is_err() {
                            return;
                        }
                        drain_stale_commands(&mut outbound_rx);
                        continue 'outage;
                    }
                },
                cmd = outbound_rx.recv() => match cmd {
                    Some(event) => {
                        let frame = match codec::encode_client(&event) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::warn!(err = %e, "failed to encode outbound event");
                                continue;
                            }
                        };
                        if let Err(e) = link.send(&frame).await {
                            let reason = e.to_string();
                            shared.set_state(ConnectionState::Disconnected);
                            tracing::info!(reason = %reason, "send failed, connection dropped");
                            if signal_tx.send(Signal::Down { reason }).await.is_err() {
                                return;
                            }
                            drain_stale_commands(&mut outbound_rx);
                            continue 'outage;
                        }
                    }
                    None => {
                        // Manager dropped; nothing left to supervise.
                        return;
                    }
                },
            }
        }
    }
}

/// Discard commands that were aimed at a connection that no longer exists.
fn drain_stale_commands(outbound_rx: &mut mpsc::Receiver<ClientEvent>) {
    while let Ok(cmd) = outbound_rx.try_recv() {
        tracing::debug!(?cmd, "discarding command queued for dead connection");
    }
}
