//! # In-Memory Secure Channel
//!
//! A [`SecureChannel`] that never touches a socket. Endpoints are plain
//! strings in a process-wide hub; a dial builds a pair of cross-wired
//! channel pipes and hands one end to the listener's accept queue.
//!
//! This is not a mock. Fingerprint pinning is enforced for real at dial
//! time, frames arrive in order, closing one end wakes the other, and the
//! accept queue applies backpressure -- the same observable contract a
//! production transport provides, minus the cryptography (identity keys
//! stand in for a handshake transcript). The loopback mode of the node
//! binary, the demo, and the integration tests all run on this hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::crypto::keys::{VesperKeypair, VesperPublicKey};
use crate::identity::Fingerprint;
use crate::network::transport::{Connection, SecureChannel, SecureListener, TransportError};

/// Frames buffered per direction before senders feel backpressure.
const FRAME_PIPE_DEPTH: usize = 64;

/// Inbound connections buffered per listener before dials block.
const ACCEPT_QUEUE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One end of an in-process duplex pipe.
pub struct MemoryConnection {
    remote_key: VesperPublicKey,
    outbound: parking_lot::Mutex<Option<mpsc::Sender<Bytes>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    closed: watch::Sender<bool>,
}

impl MemoryConnection {
    /// Build a cross-wired pair: what `a` sends, `b` receives, and vice
    /// versa. `a_key` is `a`'s own identity, so it is what `b` reports as
    /// its remote, and likewise for `b_key`.
    pub fn pair(a_key: VesperPublicKey, b_key: VesperPublicKey) -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel(FRAME_PIPE_DEPTH);
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel(FRAME_PIPE_DEPTH);

        let a = Self {
            remote_key: b_key,
            outbound: parking_lot::Mutex::new(Some(a_to_b_tx)),
            inbound: tokio::sync::Mutex::new(b_to_a_rx),
            closed: watch::channel(false).0,
        };
        let b = Self {
            remote_key: a_key,
            outbound: parking_lot::Mutex::new(Some(b_to_a_tx)),
            inbound: tokio::sync::Mutex::new(a_to_b_rx),
            closed: watch::channel(false).0,
        };
        (a, b)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn remote_public_key(&self) -> VesperPublicKey {
        self.remote_key.clone()
    }

    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        // Clone the sender out so the lock is not held across the await.
        let sender = self.outbound.lock().clone();
        match sender {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn recv(&self) -> Result<Bytes, TransportError> {
        let mut inbound = self.inbound.lock().await;
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::ConnectionClosed);
        }
        tokio::select! {
            frame = inbound.recv() => frame.ok_or(TransportError::ConnectionClosed),
            _ = closed.changed() => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        // Dropping our sender lets the peer drain in-flight frames and then
        // observe the close.
        self.outbound.lock().take();
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct BindEntry {
    bind_id: u64,
    public_key: VesperPublicKey,
    incoming: mpsc::Sender<Box<dyn Connection>>,
}

struct HubInner {
    binds: DashMap<String, BindEntry>,
    next_bind: AtomicU64,
}

/// Process-wide rendezvous for in-memory endpoints.
///
/// Clone it freely; all clones share one endpoint table.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                binds: DashMap::new(),
                next_bind: AtomicU64::new(1),
            }),
        }
    }

    /// Number of currently bound endpoints.
    pub fn bound_endpoints(&self) -> usize {
        self.inner.binds.len()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureChannel for MemoryHub {
    async fn listen(
        &self,
        identity: &VesperKeypair,
        bind_addr: &str,
    ) -> Result<Box<dyn SecureListener>, TransportError> {
        let (incoming_tx, incoming_rx) = mpsc::channel(ACCEPT_QUEUE_DEPTH);
        let bind_id = self.inner.next_bind.fetch_add(1, Ordering::Relaxed);

        match self.inner.binds.entry(bind_addr.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::Connection(format!(
                    "endpoint '{bind_addr}' is already bound"
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(BindEntry {
                    bind_id,
                    public_key: identity.public_key(),
                    incoming: incoming_tx,
                });
            }
        }

        debug!(endpoint = %bind_addr, "memory hub endpoint bound");
        Ok(Box::new(MemoryListener {
            hub: Arc::clone(&self.inner),
            endpoint: bind_addr.to_string(),
            bind_id,
            incoming: tokio::sync::Mutex::new(incoming_rx),
        }))
    }

    async fn dial(
        &self,
        identity: &VesperKeypair,
        endpoint: &str,
        expected: Fingerprint,
    ) -> Result<Box<dyn Connection>, TransportError> {
        // Copy what we need out of the map entry before any await.
        let (listener_key, accept_queue) = match self.inner.binds.get(endpoint) {
            Some(entry) => (entry.public_key.clone(), entry.incoming.clone()),
            None => {
                return Err(TransportError::Connection(format!(
                    "nothing listening at '{endpoint}'"
                )));
            }
        };

        // Pinning happens here, before the listener learns the dial exists.
        let actual = Fingerprint::of(&listener_key);
        if actual != expected {
            return Err(TransportError::Authentication { expected, actual });
        }

        let (client, server) = MemoryConnection::pair(identity.public_key(), listener_key);
        accept_queue
            .send(Box::new(server))
            .await
            .map_err(|_| {
                TransportError::Connection(format!("listener at '{endpoint}' went away"))
            })?;

        Ok(Box::new(client))
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Accept half of a bound in-memory endpoint. Unbinds itself on drop.
pub struct MemoryListener {
    hub: Arc<HubInner>,
    endpoint: String,
    bind_id: u64,
    incoming: tokio::sync::Mutex<mpsc::Receiver<Box<dyn Connection>>>,
}

#[async_trait]
impl SecureListener for MemoryListener {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    fn local_addr(&self) -> String {
        self.endpoint.clone()
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        // A replacement bound at the same endpoint keeps its slot.
        self.hub
            .binds
            .remove_if(&self.endpoint, |_, entry| entry.bind_id == self.bind_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn keypair() -> VesperKeypair {
        VesperKeypair::generate()
    }

    fn conn_pair() -> (MemoryConnection, MemoryConnection) {
        let a = keypair().public_key();
        let b = keypair().public_key();
        MemoryConnection::pair(a, b)
    }

    #[tokio::test]
    async fn pair_carries_frames_both_ways() {
        let (alice, bob) = conn_pair();
        alice.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(bob.recv().await.unwrap(), Bytes::from_static(b"ping"));

        bob.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(alice.recv().await.unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn frames_preserve_wire_order() {
        let (alice, bob) = conn_pair();
        for i in 0u8..10 {
            alice.send(Bytes::copy_from_slice(&[i])).await.unwrap();
        }
        for i in 0u8..10 {
            assert_eq!(bob.recv().await.unwrap()[0], i);
        }
    }

    #[tokio::test]
    async fn close_wakes_a_blocked_reader() {
        let (alice, bob) = conn_pair();
        let alice = Arc::new(alice);
        let reader = Arc::clone(&alice);

        let read = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;
        alice.close().await;

        let result = timeout(Duration::from_secs(1), read).await.unwrap().unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(matches!(
            bob.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn peer_close_delivers_in_flight_frames_first() {
        let (alice, bob) = conn_pair();
        alice.send(Bytes::from_static(b"one")).await.unwrap();
        alice.send(Bytes::from_static(b"two")).await.unwrap();
        alice.close().await;

        assert_eq!(bob.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(bob.recv().await.unwrap(), Bytes::from_static(b"two"));
        assert!(matches!(
            bob.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (alice, _bob) = conn_pair();
        alice.close().await;
        assert!(matches!(
            alice.send(Bytes::from_static(b"x")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn hub_dial_reaches_the_listener() {
        let hub = MemoryHub::new();
        let server_id = keypair();
        let client_id = keypair();
        let server_fp = Fingerprint::of(&server_id.public_key());

        let listener = hub.listen(&server_id, "alice:2448").await.unwrap();
        let client = hub
            .dial(&client_id, "alice:2448", server_fp)
            .await
            .unwrap();
        let server_side = listener.accept().await.unwrap();

        // Each end sees the other's authenticated identity.
        assert_eq!(client.remote_public_key(), server_id.public_key());
        assert_eq!(server_side.remote_public_key(), client_id.public_key());

        client.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(
            server_side.recv().await.unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn wrong_fingerprint_never_reaches_the_listener() {
        let hub = MemoryHub::new();
        let server_id = keypair();
        let client_id = keypair();
        let imposter_fp = Fingerprint::of(&keypair().public_key());

        let listener = hub.listen(&server_id, "alice:2448").await.unwrap();
        let result = hub.dial(&client_id, "alice:2448", imposter_fp).await;
        assert!(matches!(
            result,
            Err(TransportError::Authentication { .. })
        ));

        // The listener's accept queue stays empty.
        let got = timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(got.is_err(), "listener saw a connection it should not have");
    }

    #[tokio::test]
    async fn dialing_an_unbound_endpoint_fails() {
        let hub = MemoryHub::new();
        let client_id = keypair();
        let fp = Fingerprint::of(&client_id.public_key());
        let result = hub.dial(&client_id, "nobody:2448", fp).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn double_bind_is_refused() {
        let hub = MemoryHub::new();
        let id = keypair();
        let _first = hub.listen(&id, "alice:2448").await.unwrap();
        let second = hub.listen(&id, "alice:2448").await;
        assert!(matches!(second, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn dropping_the_listener_unbinds_the_endpoint() {
        let hub = MemoryHub::new();
        let server_id = keypair();
        let client_id = keypair();
        let server_fp = Fingerprint::of(&server_id.public_key());

        let listener = hub.listen(&server_id, "alice:2448").await.unwrap();
        assert_eq!(hub.bound_endpoints(), 1);
        drop(listener);
        assert_eq!(hub.bound_endpoints(), 0);

        let result = hub.dial(&client_id, "alice:2448", server_fp).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
