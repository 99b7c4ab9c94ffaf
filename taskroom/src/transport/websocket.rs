//! WebSocket transport for the sync channel.
//!
//! The preferred transport. Authentication happens at handshake time: the
//! session token is carried as a `token` query parameter on the upgrade
//! request, and the server refuses the upgrade (HTTP 401) before any
//! session state exists when the credential is missing or invalid.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Transport, TransportError, TransportKind};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Capacity of the channel between the reader task and `recv()` callers.
const INCOMING_BUFFER: usize = 256;

/// WebSocket transport implementing the [`Transport`] trait.
///
/// Created via [`WebSocketTransport::connect`], which performs the
/// authenticated handshake and spawns a background reader task. Dropping
/// the transport closes the underlying socket.
pub struct WebSocketTransport {
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel for frames received by the background reader task.
    incoming: Mutex<mpsc::Receiver<String>>,
    /// Whether the WebSocket connection is still active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl WebSocketTransport {
    /// Connect to the sync server and authenticate.
    ///
    /// Appends the token as a `token` query parameter, opens the WebSocket
    /// within `connect_timeout`, and spawns a background task to read
    /// incoming frames. A completed upgrade means the server accepted the
    /// credential.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the handshake exceeds `connect_timeout`.
    /// - [`TransportError::Rejected`] if the server refuses the upgrade
    ///   (HTTP error response, e.g. a bad token).
    /// - [`TransportError::Io`] for network or TLS failures.
    pub async fn connect(
        ws_url: &str,
        token: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let url = authenticated_url(ws_url, token)?;

        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = ws_url, "WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = ws_url, err = %e, "WebSocket connect failed");
                    map_ws_connect_error(e)
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        tracing::debug!(url = ws_url, "WebSocket transport established");

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // The reader task holds the read half of the socket; aborting it
        // releases both halves so the server sees the close immediately.
        self.reader_handle.abort();
    }
}

impl Transport for WebSocketTransport {
    /// Send one text frame over the WebSocket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the connection is
    /// down or the send fails.
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "WebSocket send failed");
                self.connected.store(false, Ordering::Relaxed);
                TransportError::ConnectionClosed
            })?;

        Ok(())
    }

    /// Receive the next text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the connection
    /// has been lost (the background reader task has exited).
    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }
}

/// Build the handshake URL with the token as a query parameter.
fn authenticated_url(ws_url: &str, token: &str) -> Result<url::Url, TransportError> {
    let mut url = url::Url::parse(ws_url)
        .map_err(|e| TransportError::Io(std::io::Error::other(format!("bad ws url: {e}"))))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Background task that reads WebSocket messages and forwards text frames.
///
/// Non-text frames are ignored. Sets `connected` to `false` when the
/// WebSocket closes or errors out.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<String>, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(frame)) => {
                if tx.send(frame.to_string()).await.is_err() {
                    // Receiver dropped — transport was dropped, exit.
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(_))
            | Ok(Message::Ping(_))
            | Ok(Message::Pong(_))
            | Ok(Message::Frame(_)) => {
                // The sync protocol is text-only; ignore everything else.
            }
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("WebSocket reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => TransportError::Io(io_err),
        WsError::Http(response) => {
            TransportError::Rejected(format!("server refused upgrade: status {}", response.status()))
        }
        WsError::Tls(_) => TransportError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        other => TransportError::Io(std::io::Error::other(format!("connection error: {other}"))),
    }
}
