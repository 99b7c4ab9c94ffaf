//! Loopback transport for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to simulate a connection
//! between a client and a server. Created via
//! [`LoopbackTransport::create_pair`], which returns two connected
//! endpoints — frames sent on one arrive at the other.

use tokio::sync::{Mutex, mpsc};

use super::{Transport, TransportError, TransportKind};

/// In-process transport backed by `tokio::sync::mpsc` channels.
pub struct LoopbackTransport {
    /// Sender for outgoing frames (delivers to the peer's receiver).
    tx: mpsc::Sender<String>,
    /// Receiver for incoming frames (fed by the peer's sender).
    rx: Mutex<mpsc::Receiver<String>>,
}

impl LoopbackTransport {
    /// Create a pair of connected loopback transports.
    ///
    /// Frames sent by one end are received by the other. The `buffer`
    /// parameter controls the channel capacity for each direction.
    pub fn create_pair(buffer: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(buffer);
        let (tx_b, rx_b) = mpsc::channel(buffer);

        let a = Self {
            tx: tx_b, // A sends into B's receiver
            rx: Mutex::new(rx_a),
        };
        let b = Self {
            tx: tx_a, // B sends into A's receiver
            rx: Mutex::new(rx_b),
        };

        (a, b)
    }
}

impl Transport for LoopbackTransport {
    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.tx
            .send(frame.to_string())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }
}
