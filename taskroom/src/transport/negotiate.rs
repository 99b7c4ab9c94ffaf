//! Transport negotiation: streaming first, polling as fallback.
//!
//! [`negotiate`] attempts a WebSocket connection and falls back to HTTP
//! long-polling when the upgrade cannot be established. Both outcomes are
//! wrapped in [`NegotiatedTransport`] so the connection layer handles one
//! concrete type regardless of which transport won.

use std::time::Duration;

use super::polling::PollingTransport;
use super::websocket::WebSocketTransport;
use super::{Transport, TransportError, TransportKind};

/// The transport that won negotiation.
pub enum NegotiatedTransport {
    /// Streaming WebSocket connection.
    WebSocket(WebSocketTransport),
    /// Long-polling fallback.
    Polling(PollingTransport),
}

impl Transport for NegotiatedTransport {
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        match self {
            Self::WebSocket(t) => t.send(frame).await,
            Self::Polling(t) => t.send(frame).await,
        }
    }

    async fn recv(&self) -> Result<String, TransportError> {
        match self {
            Self::WebSocket(t) => t.recv().await,
            Self::Polling(t) => t.recv().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::WebSocket(t) => t.is_connected(),
            Self::Polling(t) => t.is_connected(),
        }
    }

    fn kind(&self) -> TransportKind {
        match self {
            Self::WebSocket(t) => t.kind(),
            Self::Polling(t) => t.kind(),
        }
    }
}

/// Establish one authenticated connection to the sync server.
///
/// `base_url` is the server's HTTP base (e.g. `http://127.0.0.1:9000`);
/// the WebSocket endpoint is derived from it. The WebSocket is tried
/// first; on failure the polling fallback is attempted with the same
/// credential.
///
/// # Errors
///
/// Returns the polling transport's error when both attempts fail.
pub async fn negotiate(
    base_url: &str,
    token: &str,
    connect_timeout: Duration,
    poll_wait: Duration,
) -> Result<NegotiatedTransport, TransportError> {
    let ws_url = websocket_url(base_url);

    match WebSocketTransport::connect(&ws_url, token, connect_timeout).await {
        Ok(transport) => Ok(NegotiatedTransport::WebSocket(transport)),
        Err(ws_err) => {
            tracing::debug!(err = %ws_err, "WebSocket unavailable, trying polling fallback");
            let transport =
                PollingTransport::connect(base_url, token, connect_timeout, poll_wait).await?;
            Ok(NegotiatedTransport::Polling(transport))
        }
    }
}

/// Derive the WebSocket endpoint from an HTTP base URL.
fn websocket_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/ws")
}
