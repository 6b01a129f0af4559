//! # Transport Listener
//!
//! Binds the secure channel and runs the accept loop on its own task.
//! Accept failures for individual connections are logged and skipped; the
//! loop only exits when the listener itself is gone. Accepted connections
//! are handed straight to the dispatcher, so a slow peer never stalls the
//! next accept.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::crypto::keys::VesperKeypair;
use crate::identity::Fingerprint;
use crate::network::dispatch::Dispatcher;
use crate::network::transport::{SecureChannel, TransportError};

/// A running accept loop. Dropping it (or calling
/// [`shutdown`](Listener::shutdown)) stops accepting; the underlying bind
/// is released when the transport's listener drops with the task.
pub struct Listener {
    local_fingerprint: Fingerprint,
    bind_addr: String,
    accept_task: JoinHandle<()>,
}

impl Listener {
    /// Bind `bind_addr` and start accepting peers as `identity`.
    ///
    /// Returns once the bind has succeeded; accepted connections are
    /// registered and dispatched in the background from then on.
    pub async fn spawn(
        channel: Arc<dyn SecureChannel>,
        identity: &VesperKeypair,
        bind_addr: &str,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, TransportError> {
        let listener = channel.listen(identity, bind_addr).await?;
        let local_fingerprint = Fingerprint::of(&identity.public_key());
        info!(addr = %bind_addr, fingerprint = %local_fingerprint, "listening for peers");

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok(connection) => {
                        let remote = Fingerprint::of(&connection.remote_public_key());
                        debug!(peer = %remote, "inbound connection accepted");
                        dispatcher.install(connection).await;
                    }
                    Err(TransportError::ConnectionClosed) => {
                        info!("listener gone, accept loop exiting");
                        break;
                    }
                    Err(e) => {
                        // Per-connection failure; keep accepting.
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        Ok(Self {
            local_fingerprint,
            bind_addr: bind_addr.to_string(),
            accept_task,
        })
    }

    /// Fingerprint peers should pin when dialing us.
    pub fn local_fingerprint(&self) -> Fingerprint {
        self.local_fingerprint
    }

    /// The address the listener is bound to.
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Stop accepting new connections. Existing sessions are untouched.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
