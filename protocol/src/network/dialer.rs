//! # Transport Dialer
//!
//! Outbound connections. The caller supplies a peer address that carries
//! the expected fingerprint; the secure channel pins it during the
//! handshake, and a successful dial lands in the registry exactly like an
//! accepted inbound connection. No retries -- a failed dial is the
//! caller's problem to reschedule.

use std::sync::Arc;

use tracing::{debug, info};

use crate::crypto::keys::VesperKeypair;
use crate::identity::Fingerprint;
use crate::network::dispatch::Dispatcher;
use crate::network::transport::{PeerAddress, SecureChannel, TransportError};

/// Dials peers and installs the resulting sessions.
pub struct Dialer {
    channel: Arc<dyn SecureChannel>,
    identity: VesperKeypair,
    dispatcher: Arc<Dispatcher>,
}

impl Dialer {
    /// Wire a dialer to the transport and dispatcher.
    pub fn new(
        channel: Arc<dyn SecureChannel>,
        identity: VesperKeypair,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            channel,
            identity,
            dispatcher,
        }
    }

    /// Connect to `<fingerprint-hex>@<host>:<port>`.
    ///
    /// Fails with [`TransportError::AddressParse`] on a malformed address,
    /// [`TransportError::Authentication`] when the remote proves a
    /// different identity (nothing gets registered), and
    /// [`TransportError::Connection`] on transport failure. On success the
    /// session is registered and its dispatcher is running.
    pub async fn connect(&self, peer_addr: &str) -> Result<Fingerprint, TransportError> {
        let addr = PeerAddress::parse(peer_addr)?;
        debug!(peer = %addr.fingerprint, endpoint = %addr.endpoint, "dialing");

        let connection = self
            .channel
            .dial(&self.identity, &addr.endpoint, addr.fingerprint)
            .await?;

        // The transport pinned this already; check what it actually handed
        // back before letting the session anywhere near the registry.
        let actual = Fingerprint::of(&connection.remote_public_key());
        if actual != addr.fingerprint {
            connection.close().await;
            return Err(TransportError::Authentication {
                expected: addr.fingerprint,
                actual,
            });
        }

        self.dispatcher.install(connection).await;
        info!(peer = %addr.fingerprint, endpoint = %addr.endpoint, "outbound connection established");
        Ok(addr.fingerprint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
