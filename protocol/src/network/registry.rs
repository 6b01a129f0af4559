//! # Peer Registry
//!
//! Maps fingerprints to live sessions. The two rules that make concurrent
//! connect/disconnect traffic safe:
//!
//! 1. **Last connection wins.** Registering a fingerprint that already has
//!    a session closes the old one on the spot -- no orphaned sockets, no
//!    two dispatchers speaking for one peer.
//! 2. **Generations guard removal.** Every registration is stamped with a
//!    monotonic generation. A dispatcher that outlived its session proves
//!    its generation before removing the entry, so a stale exit can never
//!    evict a fresher replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::identity::Fingerprint;
use crate::network::session::PeerSession;

struct RegisteredSession {
    session: Arc<PeerSession>,
    generation: u64,
}

/// Shared map of fingerprint to active session.
pub struct PeerRegistry {
    peers: DashMap<Fingerprint, RegisteredSession>,
    next_generation: AtomicU64,
}

impl PeerRegistry {
    /// Create an empty registry. Generations start at 1 so that 0 can never
    /// match a live entry.
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Insert or replace the session for its fingerprint. Returns the
    /// generation stamped on this registration. A displaced session is
    /// closed before this returns.
    pub async fn register(&self, session: Arc<PeerSession>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fingerprint = session.fingerprint;
        let displaced = self
            .peers
            .insert(fingerprint, RegisteredSession { session, generation });

        if let Some(old) = displaced {
            debug!(
                peer = %fingerprint,
                old_generation = old.generation,
                new_generation = generation,
                "closing displaced session"
            );
            old.session.close().await;
        }
        generation
    }

    /// The session registered for a fingerprint, if any.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<PeerSession>> {
        self.peers
            .get(fingerprint)
            .map(|entry| Arc::clone(&entry.session))
    }

    /// Every registered session, in no particular order.
    pub fn all(&self) -> Vec<Arc<PeerSession>> {
        self.peers
            .iter()
            .map(|entry| Arc::clone(&entry.session))
            .collect()
    }

    /// Remove the entry for `fingerprint` only if it still carries
    /// `generation`. Returns whether anything was removed.
    pub fn remove_if_current(&self, fingerprint: &Fingerprint, generation: u64) -> bool {
        self.peers
            .remove_if(fingerprint, |_, entry| entry.generation == generation)
            .is_some()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drain the registry, closing every session. Used at shutdown.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<PeerSession>> = self
            .peers
            .iter()
            .map(|entry| Arc::clone(&entry.session))
            .collect();
        self.peers.clear();
        for session in sessions {
            session.close().await;
        }
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
