//! # Peer Sessions
//!
//! A [`PeerSession`] is one authenticated connection dressed up with the
//! things the rest of the node cares about: the peer's fingerprint, when it
//! connected, and where it is in its lifecycle. The session owns its
//! connection -- closing the session closes the pipe.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::VesperPublicKey;
use crate::identity::Fingerprint;
use crate::network::transport::{Connection, TransportError};
use crate::network::wire::Message;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of a session. One-way traffic: `Connecting` becomes `Active`,
/// `Active` becomes `Closed`, and `Closed` is forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connection established, not yet registered for dispatch.
    Connecting,
    /// Registered and serving traffic.
    Active,
    /// Torn down; the connection is gone.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A live, authenticated connection to one peer.
pub struct PeerSession {
    /// The peer's fingerprint, derived from its proven public key.
    pub fingerprint: Fingerprint,

    /// The public key the transport authenticated.
    pub remote_key: VesperPublicKey,

    /// When this session came up.
    pub connected_at: DateTime<Utc>,

    connection: Arc<dyn Connection>,
    state: RwLock<SessionState>,
}

impl PeerSession {
    /// Wrap an authenticated connection. Starts in `Connecting`; the
    /// dispatcher marks it `Active` once it is registered.
    pub fn new(
        fingerprint: Fingerprint,
        remote_key: VesperPublicKey,
        connection: Arc<dyn Connection>,
    ) -> Self {
        Self {
            fingerprint,
            remote_key,
            connected_at: Utc::now(),
            connection,
            state: RwLock::new(SessionState::Connecting),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Transition to `Active`. No effect on a closed session.
    pub fn mark_active(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Connecting {
            *state = SessionState::Active;
        }
    }

    /// Transition to `Closed` without touching the connection. The
    /// dispatcher uses this when the connection already died under it.
    pub fn mark_closed(&self) {
        *self.state.write() = SessionState::Closed;
    }

    /// Encode and send one message to the peer.
    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if self.state() == SessionState::Closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.connection.send(message.encode()).await
    }

    /// Await the next raw frame from the peer.
    pub async fn recv_frame(&self) -> Result<Bytes, TransportError> {
        self.connection.recv().await
    }

    /// Close the session and its connection. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        self.connection.close().await;
    }

    /// Snapshot for status rendering.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            fingerprint: self.fingerprint,
            state: self.state(),
            connected_at: self.connected_at,
        }
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("fingerprint", &self.fingerprint)
            .field("state", &self.state())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Serializable view of one session, for `sessions` listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Who the session is with.
    pub fingerprint: Fingerprint,
    /// Where it is in its lifecycle.
    pub state: SessionState,
    /// When it came up.
    pub connected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::VesperKeypair;
    use crate::network::memory::MemoryConnection;

    fn session_pair() -> (PeerSession, PeerSession) {
        let alice = VesperKeypair::generate();
        let bob = VesperKeypair::generate();
        let (a_conn, b_conn) = MemoryConnection::pair(alice.public_key(), bob.public_key());

        let a_session = PeerSession::new(
            Fingerprint::of(&bob.public_key()),
            bob.public_key(),
            Arc::new(a_conn),
        );
        let b_session = PeerSession::new(
            Fingerprint::of(&alice.public_key()),
            alice.public_key(),
            Arc::new(b_conn),
        );
        (a_session, b_session)
    }

    #[test]
    fn lifecycle_is_one_way() {
        let (session, _peer) = session_pair();
        assert_eq!(session.state(), SessionState::Connecting);

        session.mark_active();
        assert_eq!(session.state(), SessionState::Active);

        session.mark_closed();
        assert_eq!(session.state(), SessionState::Closed);

        // A closed session cannot be reactivated.
        session.mark_active();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn messages_flow_between_sessions() {
        let (alice, bob) = session_pair();
        alice.mark_active();
        bob.mark_active();

        alice.send(&Message::chat("you up?")).await.unwrap();
        let frame = bob.recv_frame().await.unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::chat("you up?"));
    }

    #[tokio::test]
    async fn send_on_closed_session_fails() {
        let (alice, _bob) = session_pair();
        alice.mark_active();
        alice.close().await;
        assert!(matches!(
            alice.send(&Message::chat("hello?")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn closing_one_side_is_seen_by_the_other() {
        let (alice, bob) = session_pair();
        alice.mark_active();
        bob.mark_active();

        alice.close().await;
        assert!(matches!(
            bob.recv_frame().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn info_snapshot_matches() {
        let (session, _peer) = session_pair();
        session.mark_active();
        let info = session.info();
        assert_eq!(info.fingerprint, session.fingerprint);
        assert_eq!(info.state, SessionState::Active);
        assert_eq!(info.connected_at, session.connected_at);
    }
}
