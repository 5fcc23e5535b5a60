//! In-memory transport for tests.
//!
//! Each [`Transport::connect`] call produces a [`MemoryPeer`] that the test
//! picks up with [`MemoryTransport::accept`] and drives by hand: read the
//! client's frames, answer them in any order, or drop the socket.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::transport::{Connection, Transport, TransportError};

/// Transport whose far end is a test.
pub struct MemoryTransport {
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
    connects: AtomicUsize,
    refuse: AtomicUsize,
    delay_ms: AtomicU64,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            peers_tx,
            peers_rx: Mutex::new(peers_rx),
            connects: AtomicUsize::new(0),
            refuse: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }
}

impl MemoryTransport {
    /// New transport accepting every connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `connect` calls so far, including refused ones.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Delay every handshake by `delay`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_connect_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.peers_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (client_tx, server_rx) = fmpsc::unbounded::<String>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<String, TransportError>>();

        let peer = MemoryPeer {
            inbound: server_rx,
            outbound: server_tx,
        };
        if self.peers_tx.send(peer).is_err() {
            return Err(TransportError::Connect("transport dropped".into()));
        }

        Ok(Connection {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(client_rx),
        })
    }
}

/// Server side of one in-memory connection.
pub struct MemoryPeer {
    inbound: fmpsc::UnboundedReceiver<String>,
    outbound: fmpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MemoryPeer {
    /// Next frame the client sent, decoded as JSON. `None` once the client
    /// has closed the socket.
    pub async fn next_frame(&mut self) -> Option<Value> {
        let text = self.inbound.next().await?;
        serde_json::from_str(&text).ok()
    }

    /// Send a JSON frame to the client.
    pub fn reply(&self, frame: &Value) -> bool {
        self.reply_raw(&frame.to_string())
    }

    /// Send raw text to the client.
    pub fn reply_raw(&self, text: &str) -> bool {
        self.outbound.unbounded_send(Ok(text.to_owned())).is_ok()
    }

    /// Deliver a frame the transport could not turn into text.
    pub fn reply_undecodable(&self) -> bool {
        self.outbound
            .unbounded_send(Err(TransportError::Malformed("invalid utf-8".into())))
            .is_ok()
    }

    /// Fail the client's read side with a transport error.
    pub fn break_pipe(&self) -> bool {
        self.outbound
            .unbounded_send(Err(TransportError::Receive("broken pipe".into())))
            .is_ok()
    }

    /// Close the socket from the server side.
    pub fn close(self) {
        self.outbound.close_channel();
    }
}
