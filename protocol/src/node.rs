//! # Node
//!
//! The `Node` is the top-level runtime entity: one identity, one registry,
//! one wallet view, one proposal store, constructed once and owned for the
//! life of the process. Everything a CLI or embedder wants to do -- listen,
//! connect, chat, inspect the wallet, move money -- hangs off this struct.
//! There are deliberately no package-level globals anywhere in the crate;
//! if you want two nodes in one process (the loopback mode does), you make
//! two of these.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{self, EVENT_CHANNEL_CAPACITY, NETWORK_ID_TESTNET};
use crate::crypto::keys::{VesperKeypair, VesperPublicKey};
use crate::identity::Fingerprint;
use crate::network::dialer::Dialer;
use crate::network::dispatch::{ChannelHandler, Dispatcher};
use crate::network::listener::Listener;
use crate::network::registry::PeerRegistry;
use crate::network::session::SessionInfo;
use crate::network::transport::{SecureChannel, TransportError};
use crate::network::wire::Message;
use crate::wallet::builder::{BuildError, BuilderConfig, TxBuilder};
use crate::wallet::ledger::{Balance, LedgerError, LedgerView};
use crate::wallet::proposal::{Proposal, ProposalError, ProposalStore};
use crate::wallet::store::{StoreError, WalletStore};
use crate::wallet::types::{TxId, Utxo};
use crate::wallet::Address;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Node-level configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Which network this node lives on; selects the address encoding.
    pub network_id: u32,

    /// Fee and threshold parameters for transaction construction.
    pub builder: BuilderConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_id: NETWORK_ID_TESTNET,
            builder: BuilderConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Things a node observes that embedders may care about. Delivered over a
/// broadcast channel; slow subscribers lose old events rather than
/// stalling the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A session came up (inbound or outbound).
    PeerConnected {
        /// Who connected.
        peer: Fingerprint,
    },
    /// A session went away and was removed from the registry.
    PeerDisconnected {
        /// Who disconnected.
        peer: Fingerprint,
    },
    /// A text-chat line arrived.
    ChatReceived {
        /// Who sent it.
        peer: Fingerprint,
        /// What they said.
        text: String,
    },
    /// A payment was built and is waiting for commit or abort.
    ProposalHeld {
        /// The held transaction.
        txid: TxId,
    },
    /// A transaction went out on the wire.
    TransactionBroadcast {
        /// The broadcast transaction.
        txid: TxId,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from node-level operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Dial, listen, or send failed at the transport layer.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Proposal lifecycle failure.
    #[error(transparent)]
    Proposal(#[from] ProposalError),

    /// Transaction construction failure.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Wallet store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ledger query failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// No active session for the peer.
    #[error("no active session for peer {0}")]
    PeerNotConnected(Fingerprint),

    /// The node already has a listener up.
    #[error("already listening on {0}")]
    AlreadyListening(String),

    /// The tag is outside the channel family `0x70..=0x7F`.
    #[error("tag 0x{0:02x} is outside the channel family")]
    InvalidChannelTag(u8),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A running Vesper node: identity, peer sessions, and wallet operations
/// under one roof.
pub struct Node {
    identity: VesperKeypair,
    config: NodeConfig,
    channel: Arc<dyn SecureChannel>,
    store: Arc<dyn WalletStore>,
    ledger: Arc<LedgerView>,
    proposals: ProposalStore,
    registry: Arc<PeerRegistry>,
    dispatcher: Arc<Dispatcher>,
    dialer: Dialer,
    listener: tokio::sync::Mutex<Option<Listener>>,
    events: broadcast::Sender<NodeEvent>,
}

impl Node {
    /// Assemble a node from its collaborators.
    ///
    /// Nothing starts running yet: call [`listen`](Node::listen) to accept
    /// peers and [`connect`](Node::connect) to dial out.
    pub fn new(
        identity: VesperKeypair,
        channel: Arc<dyn SecureChannel>,
        store: Arc<dyn WalletStore>,
        handler: Arc<dyn ChannelHandler>,
        config: NodeConfig,
    ) -> Self {
        let registry = Arc::new(PeerRegistry::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            handler,
            events.clone(),
        ));
        let ledger = Arc::new(LedgerView::new(Arc::clone(&store)));
        let builder = TxBuilder::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            config.network_id,
            config.builder.clone(),
        );
        let proposals = ProposalStore::new(builder, Arc::clone(&store), Arc::clone(&ledger));
        let dialer = Dialer::new(
            Arc::clone(&channel),
            identity.clone(),
            Arc::clone(&dispatcher),
        );

        info!(
            fingerprint = %Fingerprint::of(&identity.public_key()),
            network = config::network_name(config.network_id),
            "node assembled"
        );

        Self {
            identity,
            config,
            channel,
            store,
            ledger,
            proposals,
            registry,
            dispatcher,
            dialer,
            listener: tokio::sync::Mutex::new(None),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Identity & observation
    // -----------------------------------------------------------------------

    /// This node's fingerprint, the thing peers pin when dialing us.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.identity.public_key())
    }

    /// This node's public key.
    pub fn public_key(&self) -> VesperPublicKey {
        self.identity.public_key()
    }

    /// The configuration the node was assembled with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Subscribe to the node's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Snapshot of every registered session, oldest connection first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.registry.all().iter().map(|s| s.info()).collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    // -----------------------------------------------------------------------
    // Peer sessions
    // -----------------------------------------------------------------------

    /// Bind `bind_addr` and start accepting peers. Returns our fingerprint
    /// for advertisement. One listener per node.
    pub async fn listen(&self, bind_addr: &str) -> Result<Fingerprint, NodeError> {
        let mut slot = self.listener.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(NodeError::AlreadyListening(active.bind_addr().to_string()));
        }
        let listener = Listener::spawn(
            Arc::clone(&self.channel),
            &self.identity,
            bind_addr,
            Arc::clone(&self.dispatcher),
        )
        .await?;
        let fingerprint = listener.local_fingerprint();
        *slot = Some(listener);
        Ok(fingerprint)
    }

    /// Dial `<fingerprint-hex>@<host>:<port>` and register the session.
    pub async fn connect(&self, peer_addr: &str) -> Result<Fingerprint, NodeError> {
        Ok(self.dialer.connect(peer_addr).await?)
    }

    /// Send a chat line to a connected peer.
    pub async fn say(&self, peer: Fingerprint, text: &str) -> Result<(), NodeError> {
        let session = self
            .registry
            .lookup(&peer)
            .ok_or(NodeError::PeerNotConnected(peer))?;
        session.send(&Message::chat(text)).await?;
        debug!(peer = %peer, len = text.len(), "chat sent");
        Ok(())
    }

    /// Send an opaque channel-protocol frame to a connected peer.
    pub async fn send_channel(
        &self,
        peer: Fingerprint,
        tag: u8,
        payload: bytes::Bytes,
    ) -> Result<(), NodeError> {
        if !config::is_channel_tag(tag) {
            return Err(NodeError::InvalidChannelTag(tag));
        }
        let session = self
            .registry
            .lookup(&peer)
            .ok_or(NodeError::PeerNotConnected(peer))?;
        session.send(&Message::Channel { tag, payload }).await?;
        Ok(())
    }

    /// Stop listening and close every session. The node can listen and
    /// connect again afterwards; shutdown is about quiescing, not
    /// poisoning.
    pub async fn shutdown(&self) {
        info!(fingerprint = %self.fingerprint(), "node shutting down");
        self.listener.lock().await.take();
        self.registry.close_all().await;
    }

    // -----------------------------------------------------------------------
    // Wallet surface
    // -----------------------------------------------------------------------

    /// Total and confirmed balance in motes.
    pub fn balance(&self) -> Result<Balance, NodeError> {
        Ok(self.ledger.balance()?)
    }

    /// Every spendable output, largest first.
    pub fn utxos(&self) -> Result<Vec<Utxo>, NodeError> {
        Ok(self.ledger.all_unspent()?)
    }

    /// Mint a fresh receive address from the wallet store.
    pub fn fresh_address(&self) -> Result<Address, NodeError> {
        Ok(self.store.fresh_address()?)
    }

    /// Build a payment and hold it for inspection.
    pub fn propose(&self, request: &[(String, u64)]) -> Result<Proposal, NodeError> {
        let proposal = self.proposals.propose(request)?;
        let _ = self.events.send(NodeEvent::ProposalHeld {
            txid: proposal.txid,
        });
        Ok(proposal)
    }

    /// Broadcast a held proposal.
    pub fn commit(&self, txid: TxId) -> Result<Proposal, NodeError> {
        let proposal = self.proposals.commit(txid)?;
        let _ = self.events.send(NodeEvent::TransactionBroadcast { txid });
        Ok(proposal)
    }

    /// Release a held proposal without broadcasting.
    pub fn abort(&self, txid: TxId) -> Result<Proposal, NodeError> {
        Ok(self.proposals.abort(txid)?)
    }

    /// Propose and immediately commit.
    pub fn pay(&self, request: &[(String, u64)]) -> Result<Proposal, NodeError> {
        let proposal = self.proposals.pay(request)?;
        let _ = self.events.send(NodeEvent::TransactionBroadcast {
            txid: proposal.txid,
        });
        Ok(proposal)
    }

    /// Consolidate confirmed outputs into up to `max_txs` sweep
    /// transactions, broadcast immediately.
    pub fn sweep(&self, destination: &str, max_txs: usize) -> Result<Vec<TxId>, NodeError> {
        let txids = self.proposals.builder().build_sweep(destination, max_txs)?;
        for txid in &txids {
            let _ = self.events.send(NodeEvent::TransactionBroadcast { txid: *txid });
        }
        Ok(txids)
    }

    /// Split value into `num_outputs` outputs to one destination, broadcast
    /// immediately.
    pub fn fan_out(
        &self,
        destination: &str,
        num_outputs: u32,
        base_value: u64,
    ) -> Result<TxId, NodeError> {
        let txid = self
            .proposals
            .builder()
            .build_fan_out(destination, num_outputs, base_value)?;
        let _ = self.events.send(NodeEvent::TransactionBroadcast { txid });
        Ok(txid)
    }

    /// Look up a proposal, held or resolved.
    pub fn proposal(&self, txid: TxId) -> Option<Proposal> {
        self.proposals.get(txid)
    }

    /// All currently held proposals, oldest first.
    pub fn pending(&self) -> Vec<Proposal> {
        self.proposals.pending()
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

    use crate::config::NETWORK_ID_DEVNET;
    use crate::network::dispatch::NoopChannelHandler;
    use crate::network::memory::MemoryHub;
    use crate::wallet::store::MemoryWalletStore;

    fn devnet_config() -> NodeConfig {
        NodeConfig {
            network_id: NETWORK_ID_DEVNET,
            ..NodeConfig::default()
        }
    }

    fn node_on(hub: &MemoryHub) -> (Node, Arc<MemoryWalletStore>) {
        let store = Arc::new(MemoryWalletStore::new(NETWORK_ID_DEVNET));
        let node = Node::new(
            VesperKeypair::generate(),
            Arc::new(hub.clone()),
            store.clone(),
            Arc::new(NoopChannelHandler),
            devnet_config(),
        );
        (node, store)
    }

    async fn next_event(events: &mut broadcast::Receiver<NodeEvent>) -> NodeEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn say_without_a_session_fails() {
        let hub = MemoryHub::new();
        let (node, _store) = node_on(&hub);
        let nobody = Fingerprint::from_bytes([7u8; 16]);
        assert!(matches!(
            node.say(nobody, "anyone there?").await,
            Err(NodeError::PeerNotConnected(fp)) if fp == nobody
        ));
    }

    #[tokio::test]
    async fn second_listen_is_refused() {
        let hub = MemoryHub::new();
        let (node, _store) = node_on(&hub);

        node.listen("node:2448").await.unwrap();
        let err = node.listen("node:2449").await.unwrap_err();
        assert!(matches!(err, NodeError::AlreadyListening(addr) if addr == "node:2448"));
    }

    #[tokio::test]
    async fn channel_tag_outside_the_family_is_refused() {
        let hub = MemoryHub::new();
        let (node, _store) = node_on(&hub);
        let nobody = Fingerprint::from_bytes([7u8; 16]);
        let err = node
            .send_channel(nobody, 0x42, bytes::Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidChannelTag(0x42)));
    }

    #[tokio::test]
    async fn two_nodes_chat_over_the_hub() {
        let hub = MemoryHub::new();
        let (alice, _alice_store) = node_on(&hub);
        let (bob, _bob_store) = node_on(&hub);
        let mut bob_events = bob.subscribe();

        let bob_fp = bob.listen("bob:2448").await.unwrap();
        let dialed = alice.connect(&format!("{bob_fp}@bob:2448")).await.unwrap();
        assert_eq!(dialed, bob_fp);

        // Bob sees the inbound session.
        assert!(matches!(
            next_event(&mut bob_events).await,
            NodeEvent::PeerConnected { peer } if peer == alice.fingerprint()
        ));

        alice.say(bob_fp, "ahoy").await.unwrap();
        match next_event(&mut bob_events).await {
            NodeEvent::ChatReceived { peer, text } => {
                assert_eq!(peer, alice.fingerprint());
                assert_eq!(text, "ahoy");
            }
            other => panic!("expected ChatReceived, got {other:?}"),
        }

        assert_eq!(alice.sessions().len(), 1);
        assert_eq!(bob.sessions().len(), 1);
    }

    #[tokio::test]
    async fn wallet_surface_flows_through_the_node() {
        let hub = MemoryHub::new();
        let (node, store) = node_on(&hub);
        store.seed_utxo(60_000, 5);

        let balance = node.balance().unwrap();
        assert_eq!(balance.total, 60_000);
        assert_eq!(balance.confirmed, 60_000);

        let destination = node.fresh_address().unwrap().encode();
        let mut events = node.subscribe();

        let held = node.propose(&[(destination, 30_000)]).unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            NodeEvent::ProposalHeld { txid } if txid == held.txid
        ));
        assert_eq!(node.pending().len(), 1);

        node.commit(held.txid).unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            NodeEvent::TransactionBroadcast { txid } if txid == held.txid
        ));
        assert_eq!(store.broadcast_count(), 1);
        assert!(node.pending().is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_sessions_on_both_sides() {
        let hub = MemoryHub::new();
        let (alice, _a) = node_on(&hub);
        let (bob, _b) = node_on(&hub);
        let mut bob_events = bob.subscribe();

        let bob_fp = bob.listen("bob:2448").await.unwrap();
        alice.connect(&format!("{bob_fp}@bob:2448")).await.unwrap();
        let _ = next_event(&mut bob_events).await; // PeerConnected

        alice.shutdown().await;

        // Bob's dispatcher notices the close and evicts the session.
        assert!(matches!(
            next_event(&mut bob_events).await,
            NodeEvent::PeerDisconnected { .. }
        ));
        assert!(alice.sessions().is_empty());

        // Alice can come back afterwards.
        alice.listen("alice:2448").await.unwrap();
    }
}
