//! # Secure Transport Seam
//!
//! Vesper does not implement its own handshake or stream cipher. It talks to
//! the world through the [`SecureChannel`] trait: hand it an identity key and
//! an address, get back an authenticated [`Connection`] whose remote public
//! key has already been proven by the transport. Everything above this seam
//! -- sessions, dispatch, the registry -- is transport-agnostic.
//!
//! Two implementations matter in practice: a real encrypted socket transport
//! (out of tree) and the in-process [`MemoryHub`](crate::network::memory::MemoryHub)
//! used by tests, the demo, and the node binary's loopback mode.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::DEFAULT_PEER_PORT;
use crate::crypto::keys::{VesperKeypair, VesperPublicKey};
use crate::identity::Fingerprint;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by the transport layer and its consumers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A peer address string did not decompose into fingerprint and endpoint.
    #[error("could not parse peer address '{0}' (want <fingerprint-hex>@<host>:<port>)")]
    AddressParse(String),

    /// The remote proved a different identity than the one we pinned.
    #[error("remote identity mismatch: expected {expected}, got {actual}")]
    Authentication {
        /// Fingerprint the caller pinned.
        expected: Fingerprint,
        /// Fingerprint the remote actually proved.
        actual: Fingerprint,
    },

    /// Dial, bind, or I/O failure underneath the secure channel.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection is closed; no more frames will flow.
    #[error("connection closed")]
    ConnectionClosed,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An authenticated, encrypted, ordered byte-frame pipe to one peer.
///
/// The transport has already completed its handshake by the time a
/// `Connection` exists: [`remote_public_key`](Connection::remote_public_key)
/// returns a key the remote proved possession of, not a claim.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The authenticated public key of the peer on the other end.
    fn remote_public_key(&self) -> VesperPublicKey;

    /// Send one frame. Blocks only on transport backpressure.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Receive the next frame, preserving wire order.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the peer closes or
    /// the connection drops; in-flight frames are delivered first.
    async fn recv(&self) -> Result<Bytes, TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Accepts inbound authenticated connections on one bound address.
#[async_trait]
pub trait SecureListener: Send + Sync {
    /// Wait for the next inbound connection.
    ///
    /// Per-connection failures surface as errors the accept loop can skip;
    /// [`TransportError::ConnectionClosed`] means the listener itself is
    /// gone and accepting should stop.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// The address this listener is bound to.
    fn local_addr(&self) -> String;
}

/// Factory for authenticated connections: the handshake lives behind here.
#[async_trait]
pub trait SecureChannel: Send + Sync {
    /// Bind `bind_addr` and start accepting, authenticating inbound peers
    /// as `identity`.
    async fn listen(
        &self,
        identity: &VesperKeypair,
        bind_addr: &str,
    ) -> Result<Box<dyn SecureListener>, TransportError>;

    /// Dial `endpoint`, authenticate as `identity`, and verify that the
    /// remote proves the `expected` fingerprint. A mismatch fails with
    /// [`TransportError::Authentication`] and leaves nothing open.
    async fn dial(
        &self,
        identity: &VesperKeypair,
        endpoint: &str,
        expected: Fingerprint,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

// ---------------------------------------------------------------------------
// Peer addresses
// ---------------------------------------------------------------------------

/// A dialable peer: pinned fingerprint plus transport endpoint.
///
/// Canonical form is `<32-hex-fingerprint>@<host>:<port>`. A missing port
/// gets the default peer port appended, so `a1b2..@10.0.0.5` dials port
/// 2448.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    /// Identity the remote must prove.
    pub fingerprint: Fingerprint,
    /// Where the transport should connect, `host:port`.
    pub endpoint: String,
}

impl PeerAddress {
    /// Parse `<fingerprint-hex>@<host>[:<port>]`.
    pub fn parse(s: &str) -> Result<Self, TransportError> {
        let (fp_part, host_part) = s
            .split_once('@')
            .ok_or_else(|| TransportError::AddressParse(s.to_string()))?;

        let fingerprint = Fingerprint::from_hex(fp_part)
            .map_err(|_| TransportError::AddressParse(s.to_string()))?;

        if host_part.is_empty() {
            return Err(TransportError::AddressParse(s.to_string()));
        }
        let endpoint = if host_part.contains(':') {
            host_part.to_string()
        } else {
            format!("{host_part}:{DEFAULT_PEER_PORT}")
        };

        Ok(Self {
            fingerprint,
            endpoint,
        })
    }
}

impl FromStr for PeerAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.fingerprint, self.endpoint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
