//! # Receive Dispatch
//!
//! Every authenticated connection gets exactly one dispatcher task: a loop
//! that pulls frames, decodes the tag, and routes. Chat goes to the event
//! stream, channel frames go to the pluggable [`ChannelHandler`], unknown
//! tags get logged and skipped. The loop runs until the connection dies,
//! then cleans its session out of the registry -- but only if no newer
//! session has taken the slot in the meantime.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::identity::Fingerprint;
use crate::network::registry::PeerRegistry;
use crate::network::session::PeerSession;
use crate::network::transport::{Connection, TransportError};
use crate::network::wire::Message;
use crate::node::NodeEvent;

// ---------------------------------------------------------------------------
// Channel handler seam
// ---------------------------------------------------------------------------

/// Error surfaced by a channel handler. Handler failures never kill the
/// session; they are logged and the next frame is processed.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Wrap any printable cause.
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// Consumer of channel-protocol frames (tags `0x70..=0x7F`).
///
/// Payloads are opaque to the node; whatever implements the channel
/// protocol plugs in here.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Handle one channel frame from `peer`.
    async fn handle(&self, peer: Fingerprint, tag: u8, payload: Bytes)
        -> Result<(), HandlerError>;
}

/// Handler for nodes that do not speak the channel protocol: logs and
/// drops every frame.
pub struct NoopChannelHandler;

#[async_trait]
impl ChannelHandler for NoopChannelHandler {
    async fn handle(
        &self,
        peer: Fingerprint,
        tag: u8,
        payload: Bytes,
    ) -> Result<(), HandlerError> {
        trace!(peer = %peer, tag = format_args!("0x{tag:02x}"), len = payload.len(), "channel frame dropped (no handler)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Registers authenticated connections and runs their receive loops.
///
/// Shared by the listener's accept loop and the dialer: both paths hand
/// their fresh connection to [`install`](Dispatcher::install) and walk
/// away.
pub struct Dispatcher {
    registry: Arc<PeerRegistry>,
    handler: Arc<dyn ChannelHandler>,
    events: broadcast::Sender<NodeEvent>,
}

impl Dispatcher {
    /// Wire a dispatcher to the registry, handler, and event stream.
    pub fn new(
        registry: Arc<PeerRegistry>,
        handler: Arc<dyn ChannelHandler>,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        Self {
            registry,
            handler,
            events,
        }
    }

    /// Register a session for the connection and spawn its receive loop.
    ///
    /// Never blocks on the peer: the loop runs on its own task. Returns the
    /// registered session.
    pub async fn install(&self, connection: Box<dyn Connection>) -> Arc<PeerSession> {
        let remote_key = connection.remote_public_key();
        let fingerprint = Fingerprint::of(&remote_key);
        let session = Arc::new(PeerSession::new(
            fingerprint,
            remote_key,
            Arc::from(connection),
        ));

        let generation = self.registry.register(Arc::clone(&session)).await;
        session.mark_active();
        info!(peer = %fingerprint, generation, "peer session registered");
        let _ = self.events.send(NodeEvent::PeerConnected { peer: fingerprint });

        let registry = Arc::clone(&self.registry);
        let handler = Arc::clone(&self.handler);
        let events = self.events.clone();
        let loop_session = Arc::clone(&session);
        tokio::spawn(async move {
            Self::run(registry, handler, events, loop_session, generation).await;
        });

        session
    }

    /// The per-connection receive loop.
    async fn run(
        registry: Arc<PeerRegistry>,
        handler: Arc<dyn ChannelHandler>,
        events: broadcast::Sender<NodeEvent>,
        session: Arc<PeerSession>,
        generation: u64,
    ) {
        let peer = session.fingerprint;
        debug!(peer = %peer, generation, "dispatcher started");

        loop {
            let frame = match session.recv_frame().await {
                Ok(frame) => frame,
                Err(TransportError::ConnectionClosed) => {
                    info!(peer = %peer, "connection closed");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "connection failed");
                    break;
                }
            };

            match Message::decode(&frame) {
                Ok(Message::Chat { text }) => {
                    info!(peer = %peer, text = %text, "chat received");
                    let _ = events.send(NodeEvent::ChatReceived { peer, text });
                }
                Ok(Message::Channel { tag, payload }) => {
                    trace!(peer = %peer, tag = format_args!("0x{tag:02x}"), len = payload.len(), "channel frame");
                    if let Err(e) = handler.handle(peer, tag, payload).await {
                        warn!(peer = %peer, tag = format_args!("0x{tag:02x}"), error = %e, "channel handler failed");
                    }
                }
                Err(e) if !e.is_fatal() => {
                    debug!(peer = %peer, error = %e, "skipping frame");
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "dispatcher stopping on decode error");
                    break;
                }
            }
        }

        session.close().await;
        if registry.remove_if_current(&peer, generation) {
            debug!(peer = %peer, generation, "session removed from registry");
            let _ = events.send(NodeEvent::PeerDisconnected { peer });
        } else {
            // A newer session owns the slot now; leave it alone.
            debug!(peer = %peer, generation, "session already replaced, nothing to remove");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::timeout;

    use crate::crypto::keys::VesperKeypair;
    use crate::network::memory::MemoryConnection;
    use crate::network::session::SessionState;

    struct RecordingHandler {
        seen: Mutex<Vec<(Fingerprint, u8, Vec<u8>)>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn new(fail: bool) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl ChannelHandler for RecordingHandler {
        async fn handle(
            &self,
            peer: Fingerprint,
            tag: u8,
            payload: Bytes,
        ) -> Result<(), HandlerError> {
            self.seen.lock().push((peer, tag, payload.to_vec()));
            if self.fail {
                Err(HandlerError::new("handler said no"))
            } else {
                Ok(())
            }
        }
    }

    struct Rig {
        registry: Arc<PeerRegistry>,
        handler: Arc<RecordingHandler>,
        dispatcher: Dispatcher,
        events: broadcast::Receiver<NodeEvent>,
    }

    fn rig(handler_fails: bool) -> Rig {
        let registry = Arc::new(PeerRegistry::new());
        let handler = Arc::new(RecordingHandler::new(handler_fails));
        let (events_tx, events) = broadcast::channel(64);
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&handler) as Arc<dyn ChannelHandler>,
            events_tx,
        );
        Rig {
            registry,
            handler,
            dispatcher,
            events,
        }
    }

    /// Dispatcher-side connection for a fresh peer identity, plus the far
    /// end of the pipe for the test to drive.
    fn connection_from(peer: &VesperKeypair) -> (Box<dyn Connection>, MemoryConnection) {
        let local = VesperKeypair::generate();
        let (near, far) = MemoryConnection::pair(local.public_key(), peer.public_key());
        (Box::new(near), far)
    }

    async fn next_event(events: &mut broadcast::Receiver<NodeEvent>) -> NodeEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn chat_frames_become_events() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let peer_fp = Fingerprint::of(&peer.public_key());
        let (near, far) = connection_from(&peer);

        r.dispatcher.install(near).await;
        assert!(matches!(
            next_event(&mut r.events).await,
            NodeEvent::PeerConnected { peer } if peer == peer_fp
        ));

        far.send(Message::chat("hello there").encode()).await.unwrap();
        match next_event(&mut r.events).await {
            NodeEvent::ChatReceived { peer, text } => {
                assert_eq!(peer, peer_fp);
                assert_eq!(text, "hello there");
            }
            other => panic!("expected ChatReceived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn channel_frames_reach_the_handler() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let peer_fp = Fingerprint::of(&peer.public_key());
        let (near, far) = connection_from(&peer);

        r.dispatcher.install(near).await;
        let _ = next_event(&mut r.events).await; // PeerConnected

        let msg = Message::Channel {
            tag: 0x75,
            payload: Bytes::from_static(&[1, 2, 3]),
        };
        far.send(msg.encode()).await.unwrap();

        // Chat after the channel frame proves ordering: once the chat event
        // arrives, the handler must have seen the channel frame.
        far.send(Message::chat("marker").encode()).await.unwrap();
        let _ = next_event(&mut r.events).await;

        let seen = r.handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (peer_fp, 0x75, vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn handler_failure_does_not_kill_the_session() {
        let mut r = rig(true);
        let peer = VesperKeypair::generate();
        let (near, far) = connection_from(&peer);

        let session = r.dispatcher.install(near).await;
        let _ = next_event(&mut r.events).await; // PeerConnected

        let msg = Message::Channel {
            tag: 0x70,
            payload: Bytes::from_static(&[0xFF]),
        };
        far.send(msg.encode()).await.unwrap();

        // The session survives the handler error and still delivers chat.
        far.send(Message::chat("still alive").encode()).await.unwrap();
        assert!(matches!(
            next_event(&mut r.events).await,
            NodeEvent::ChatReceived { .. }
        ));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(r.handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tags_are_skipped() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let (near, far) = connection_from(&peer);

        let session = r.dispatcher.install(near).await;
        let _ = next_event(&mut r.events).await;

        far.send(Bytes::from_static(&[0x42, 0x00])).await.unwrap();
        far.send(Message::chat("after the weird frame").encode())
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut r.events).await,
            NodeEvent::ChatReceived { .. }
        ));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn empty_frame_terminates_the_session() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let peer_fp = Fingerprint::of(&peer.public_key());
        let (near, far) = connection_from(&peer);

        r.dispatcher.install(near).await;
        let _ = next_event(&mut r.events).await;

        far.send(Bytes::new()).await.unwrap();
        assert!(matches!(
            next_event(&mut r.events).await,
            NodeEvent::PeerDisconnected { peer } if peer == peer_fp
        ));
        assert!(r.registry.is_empty());
    }

    #[tokio::test]
    async fn peer_close_removes_the_session() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let (near, far) = connection_from(&peer);

        let session = r.dispatcher.install(near).await;
        let _ = next_event(&mut r.events).await;

        far.close().await;
        assert!(matches!(
            next_event(&mut r.events).await,
            NodeEvent::PeerDisconnected { .. }
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(r.registry.is_empty());
    }

    #[tokio::test]
    async fn replaced_session_exit_leaves_the_replacement_registered() {
        let mut r = rig(false);
        let peer = VesperKeypair::generate();
        let peer_fp = Fingerprint::of(&peer.public_key());
        let (first_near, _first_far) = connection_from(&peer);
        let (second_near, _second_far) = connection_from(&peer);

        let first = r.dispatcher.install(first_near).await;
        let _ = next_event(&mut r.events).await;

        // Same fingerprint reconnects; registration closes the first
        // session, whose dispatcher then exits.
        let second = r.dispatcher.install(second_near).await;
        let _ = next_event(&mut r.events).await;

        // Give the first dispatcher time to notice and exit.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(first.state(), SessionState::Closed);
        assert_eq!(second.state(), SessionState::Active);
        assert_eq!(r.registry.len(), 1);

        // The registry still serves the replacement.
        let registered = r.registry.lookup(&peer_fp).unwrap();
        assert_eq!(registered.state(), SessionState::Active);
    }
}
