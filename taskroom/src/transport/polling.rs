//! HTTP long-polling transport for the sync channel.
//!
//! The fallback transport, used when a WebSocket cannot be established
//! (restrictive proxies, WebSocket upgrades disabled server-side). It
//! presents the same surface as the streaming transport: a session is
//! created with the token, a background task drains frame batches from
//! the poll endpoint, and outbound frames are POSTed one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};

use super::{Transport, TransportError, TransportKind};

/// Capacity of the channel between the poller task and `recv()` callers.
const INCOMING_BUFFER: usize = 256;

/// Extra slack on top of the server's long-poll hold before a poll
/// request is considered lost.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Response body of the session creation endpoint.
#[derive(Debug, Deserialize)]
struct PollSession {
    session: String,
}

/// Long-polling transport implementing the [`Transport`] trait.
///
/// Created via [`PollingTransport::connect`]. Dropping the transport stops
/// the background poller; the server expires the session on its own.
pub struct PollingTransport {
    /// HTTP client shared with the background poller.
    http: reqwest::Client,
    /// Send endpoint for outbound frames.
    send_url: String,
    /// Whether the polling session is still alive.
    connected: Arc<AtomicBool>,
    /// Channel for frames drained by the background poller task.
    incoming: Mutex<mpsc::Receiver<String>>,
    /// Handle to the background poller task.
    poller_handle: tokio::task::JoinHandle<()>,
}

impl PollingTransport {
    /// Create a polling session against the sync server.
    ///
    /// `base_url` is the server's HTTP base (e.g. `http://127.0.0.1:9000`).
    /// The token is carried as a `token` query parameter on session
    /// creation, mirroring the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if session creation exceeds `connect_timeout`.
    /// - [`TransportError::Rejected`] if the server refuses the credential.
    /// - [`TransportError::Io`] for network failures.
    pub async fn connect(
        base_url: &str,
        token: &str,
        connect_timeout: Duration,
        poll_wait: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let base = base_url.trim_end_matches('/');
        let session_url = format!("{base}/poll/session");

        let response = http
            .post(&session_url)
            .query(&[("token", token)])
            .timeout(connect_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    tracing::warn!(url = %session_url, err = %e, "polling session request failed");
                    TransportError::Io(std::io::Error::other(e))
                }
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Rejected(
                "server refused polling session: status 401".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "polling session failed: status {}",
                response.status()
            ))));
        }

        let session: PollSession = response
            .json()
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let poll_url = format!("{base}/poll/{}", session.session);
        let send_url = format!("{base}/poll/{}/send", session.session);

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let poller_connected = Arc::clone(&connected);
        let poller_http = http.clone();
        let poller_handle = tokio::spawn(poll_loop(
            poller_http,
            poll_url,
            poll_wait + POLL_SLACK,
            tx,
            poller_connected,
        ));

        tracing::debug!(url = base, session = %session.session, "polling transport established");

        Ok(Self {
            http,
            send_url,
            connected,
            incoming: Mutex::new(rx),
            poller_handle,
        })
    }
}

impl Transport for PollingTransport {
    /// POST one text frame to the session's send endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the session has
    /// expired or the server is unreachable.
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let response = self
            .http
            .post(&self.send_url)
            .body(frame.to_string())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "polling send failed");
                self.connected.store(false, Ordering::Relaxed);
                TransportError::ConnectionClosed
            })?;

        if !response.status().is_success() {
            self.connected.store(false, Ordering::Relaxed);
            return Err(TransportError::ConnectionClosed);
        }

        Ok(())
    }

    /// Receive the next text frame drained by the poller.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the session has
    /// been lost (the background poller task has exited).
    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        // The poller would otherwise keep long-polling a dead session.
        self.poller_handle.abort();
    }
}

/// Background task that repeatedly long-polls for frame batches.
///
/// Each successful poll returns a (possibly empty) JSON array of frames.
/// A 404/410 means the session expired; any network error ends the
/// session. Sets `connected` to `false` on exit.
async fn poll_loop(
    http: reqwest::Client,
    poll_url: String,
    request_timeout: Duration,
    tx: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let response = match http
            .get(&poll_url)
            .timeout(request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(err = %e, "poll request failed");
                break;
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::GONE
        {
            tracing::info!("polling session expired server-side");
            break;
        }
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "poll returned error status");
            break;
        }

        let frames: Vec<String> = match response.json().await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(err = %e, "malformed poll batch");
                break;
            }
        };

        for frame in frames {
            if tx.send(frame).await.is_err() {
                // Receiver dropped — transport was dropped, exit.
                connected.store(false, Ordering::Relaxed);
                return;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("poller task exiting");
}
