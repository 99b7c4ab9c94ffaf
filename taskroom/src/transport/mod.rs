//! Transport layer abstraction for the sync channel.
//!
//! Defines the [`Transport`] trait that all transport implementations must
//! satisfy. Concrete implementations:
//! - [`websocket::WebSocketTransport`] — the preferred streaming transport
//! - [`polling::PollingTransport`] — HTTP long-polling fallback
//! - [`loopback::LoopbackTransport`] — in-process channel-based transport
//!   for testing
//!
//! Frames are JSON text; encoding and decoding happen above this layer
//! (see `taskroom_proto::codec`). The transport never inspects frame
//! contents.

pub mod loopback;
pub mod negotiate;
pub mod polling;
pub mod websocket;

use std::fmt;

pub use negotiate::{NegotiatedTransport, negotiate};

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent WebSocket connection.
    WebSocket,
    /// HTTP long-polling fallback.
    Polling,
    /// In-process loopback for testing.
    Loopback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "WebSocket"),
            Self::Polling => write!(f, "Polling"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the server has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The server refused the handshake (bad or missing credential).
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async transport trait for exchanging text frames with the sync server.
///
/// A transport represents one established, authenticated connection. It is
/// created connected and cannot be re-opened: when either operation
/// reports [`TransportError::ConnectionClosed`], the owner discards the
/// transport and negotiates a fresh one.
pub trait Transport: Send + Sync {
    /// Send one text frame to the server.
    fn send(
        &self,
        frame: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next text frame from the server.
    ///
    /// Blocks asynchronously until a frame arrives.
    fn recv(&self) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;

    /// Check whether this transport still has an active connection.
    fn is_connected(&self) -> bool;

    /// Return the type of this transport.
    fn kind(&self) -> TransportKind;
}
