//! # Payment Proposals
//!
//! A payment is never broadcast the moment it is built. `build_payment`
//! produces a *proposal*: a fully signed transaction whose inputs are
//! reserved but which has not touched the wire. The caller inspects it --
//! destinations, amounts, fee, txid -- then either commits (broadcast and
//! mark spent) or aborts (hand the inputs back).
//!
//! Resolved proposals stay in the store so that a txid can still be looked
//! up after the fact. Only `Held` proposals pin reservations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::builder::{BuildError, TxBuilder};
use super::ledger::LedgerView;
use super::store::{StoreError, WalletStore};
use super::types::{Outpoint, SignedTx, TxId};

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// Lifecycle of a proposal. Strictly one-way: `Held` resolves to exactly
/// one of `Broadcast` or `Aborted`, and resolved proposals never move
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Signed, inputs reserved, not yet broadcast.
    Held,
    /// Committed and on the wire.
    Broadcast,
    /// Given up; inputs returned to the spendable pool.
    Aborted,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalState::Held => write!(f, "held"),
            ProposalState::Broadcast => write!(f, "broadcast"),
            ProposalState::Aborted => write!(f, "aborted"),
        }
    }
}

/// A signed payment awaiting a commit-or-abort decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Transaction ID, stable from the moment of construction.
    pub txid: TxId,

    /// The signed transaction itself.
    pub tx: SignedTx,

    /// Outpoints this payment consumes; reserved while `Held`.
    pub consumed: Vec<Outpoint>,

    /// Where the proposal is in its lifecycle.
    pub state: ProposalState,

    /// When the proposal was created.
    pub held_at: DateTime<Utc>,
}

impl Proposal {
    /// Wrap a freshly built transaction as a held proposal.
    pub(crate) fn held(tx: SignedTx, consumed: Vec<Outpoint>) -> Self {
        Self {
            txid: tx.txid,
            tx,
            consumed,
            state: ProposalState::Held,
            held_at: Utc::now(),
        }
    }

    /// Total value leaving the wallet, fee included.
    pub fn total_spend(&self) -> u64 {
        self.tx.total_output_value() + self.tx.fee
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from proposal lifecycle operations.
#[derive(Debug, Error)]
pub enum ProposalError {
    /// No *held* proposal with that txid: it never existed, or it already
    /// resolved. Resolved proposals remain visible through [`ProposalStore::get`]
    /// but cannot be committed or aborted again.
    #[error("no held proposal with txid {0}")]
    UnknownProposal(TxId),

    /// Construction failed before a proposal existed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The wallet store failed during commit.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// ProposalStore
// ---------------------------------------------------------------------------

/// Builds, tracks, and resolves payment proposals.
///
/// The map lock is held across commit's broadcast-and-mark-spent sequence,
/// so two tasks racing to commit the same proposal serialize cleanly: one
/// broadcasts, the other gets [`ProposalError::UnknownProposal`].
pub struct ProposalStore {
    builder: TxBuilder,
    store: Arc<dyn WalletStore>,
    ledger: Arc<LedgerView>,
    proposals: Mutex<HashMap<TxId, Proposal>>,
}

impl ProposalStore {
    /// Create an empty proposal store over the given builder.
    pub fn new(builder: TxBuilder, store: Arc<dyn WalletStore>, ledger: Arc<LedgerView>) -> Self {
        Self {
            builder,
            store,
            ledger,
            proposals: Mutex::new(HashMap::new()),
        }
    }

    /// Build a payment and hold it for inspection.
    pub fn propose(&self, request: &[(String, u64)]) -> Result<Proposal, ProposalError> {
        let proposal = self.builder.build_payment(request)?;
        debug!(txid = %proposal.txid, spend = proposal.total_spend(), "proposal held");
        self.proposals
            .lock()
            .insert(proposal.txid, proposal.clone());
        Ok(proposal)
    }

    /// Broadcast a held proposal and mark its inputs spent.
    ///
    /// A broadcast failure leaves the proposal held -- the reservation
    /// stands and the commit can be retried (or aborted).
    pub fn commit(&self, txid: TxId) -> Result<Proposal, ProposalError> {
        let mut proposals = self.proposals.lock();
        let proposal = proposals
            .get_mut(&txid)
            .filter(|p| p.state == ProposalState::Held)
            .ok_or(ProposalError::UnknownProposal(txid))?;

        self.store.broadcast(&proposal.tx)?;

        if let Err(e) = self.store.mark_spent(&proposal.consumed) {
            // Already on the wire; the store reconciles when the spend
            // confirms.
            warn!(txid = %txid, error = %e, "spent-marking failed after broadcast");
        }
        self.ledger.release(&proposal.consumed);
        proposal.state = ProposalState::Broadcast;

        info!(txid = %txid, spend = proposal.total_spend(), "proposal committed");
        Ok(proposal.clone())
    }

    /// Release a held proposal's inputs without broadcasting.
    pub fn abort(&self, txid: TxId) -> Result<Proposal, ProposalError> {
        let mut proposals = self.proposals.lock();
        let proposal = proposals
            .get_mut(&txid)
            .filter(|p| p.state == ProposalState::Held)
            .ok_or(ProposalError::UnknownProposal(txid))?;

        self.ledger.release(&proposal.consumed);
        proposal.state = ProposalState::Aborted;

        info!(txid = %txid, "proposal aborted");
        Ok(proposal.clone())
    }

    /// Propose and immediately commit, for callers who have nothing to
    /// inspect. If the commit fails the proposal is aborted so no
    /// reservation leaks.
    pub fn pay(&self, request: &[(String, u64)]) -> Result<Proposal, ProposalError> {
        let proposal = self.propose(request)?;
        match self.commit(proposal.txid) {
            Ok(committed) => Ok(committed),
            Err(e) => {
                if let Err(abort_err) = self.abort(proposal.txid) {
                    warn!(txid = %proposal.txid, error = %abort_err, "abort after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    /// Look up a proposal, held or resolved.
    pub fn get(&self, txid: TxId) -> Option<Proposal> {
        self.proposals.lock().get(&txid).cloned()
    }

    /// All currently held proposals, oldest first.
    pub fn pending(&self) -> Vec<Proposal> {
        let proposals = self.proposals.lock();
        let mut pending: Vec<Proposal> = proposals
            .values()
            .filter(|p| p.state == ProposalState::Held)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.held_at);
        pending
    }

    /// Number of currently held proposals.
    pub fn pending_count(&self) -> usize {
        self.proposals
            .lock()
            .values()
            .filter(|p| p.state == ProposalState::Held)
            .count()
    }

    /// The builder this store constructs payments with.
    pub fn builder(&self) -> &TxBuilder {
        &self.builder
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NETWORK_ID_DEVNET;
    use crate::wallet::address::Address;
    use crate::wallet::builder::BuilderConfig;
    use crate::wallet::store::MemoryWalletStore;
    use crate::wallet::types::{TxOutput, Utxo};

    fn setup() -> (Arc<MemoryWalletStore>, Arc<LedgerView>, ProposalStore) {
        let store = Arc::new(MemoryWalletStore::new(NETWORK_ID_DEVNET));
        let ledger = Arc::new(LedgerView::new(store.clone()));
        let builder = TxBuilder::new(
            store.clone(),
            ledger.clone(),
            NETWORK_ID_DEVNET,
            BuilderConfig::default(),
        );
        let proposals = ProposalStore::new(builder, store.clone(), ledger.clone());
        (store, ledger, proposals)
    }

    fn dest() -> String {
        Address::new(NETWORK_ID_DEVNET, [9u8; 20]).unwrap().encode()
    }

    #[test]
    fn propose_then_commit_broadcasts_once() {
        let (store, ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let held = proposals.propose(&[(dest(), 30_000)]).unwrap();
        assert_eq!(held.state, ProposalState::Held);
        assert_eq!(store.broadcast_count(), 0);
        assert_eq!(ledger.reserved_count(), 1);

        let committed = proposals.commit(held.txid).unwrap();
        assert_eq!(committed.state, ProposalState::Broadcast);
        assert_eq!(store.broadcast_count(), 1);
        assert_eq!(ledger.reserved_count(), 0);

        // The consumed input is gone from the spendable set.
        let remaining = store.all_unspent().unwrap();
        assert!(remaining.iter().all(|u| u.outpoint != held.consumed[0]));
    }

    #[test]
    fn commit_twice_fails_without_rebroadcast() {
        let (store, _ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let held = proposals.propose(&[(dest(), 30_000)]).unwrap();
        proposals.commit(held.txid).unwrap();

        let err = proposals.commit(held.txid).unwrap_err();
        assert!(matches!(err, ProposalError::UnknownProposal(t) if t == held.txid));
        assert_eq!(store.broadcast_count(), 1);

        // The resolved proposal is still inspectable.
        let snapshot = proposals.get(held.txid).unwrap();
        assert_eq!(snapshot.state, ProposalState::Broadcast);
    }

    #[test]
    fn abort_releases_inputs_for_reuse() {
        let (store, ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let held = proposals.propose(&[(dest(), 30_000)]).unwrap();
        let aborted = proposals.abort(held.txid).unwrap();
        assert_eq!(aborted.state, ProposalState::Aborted);
        assert_eq!(ledger.reserved_count(), 0);
        assert_eq!(store.broadcast_count(), 0);

        // The same input can fund a new proposal now.
        let again = proposals.propose(&[(dest(), 30_000)]).unwrap();
        assert_eq!(again.consumed, held.consumed);
    }

    #[test]
    fn commit_after_abort_fails() {
        let (store, _ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let held = proposals.propose(&[(dest(), 30_000)]).unwrap();
        proposals.abort(held.txid).unwrap();

        let err = proposals.commit(held.txid).unwrap_err();
        assert!(matches!(err, ProposalError::UnknownProposal(_)));
        assert_eq!(store.broadcast_count(), 0);

        // Aborting a second time is equally refused.
        assert!(matches!(
            proposals.abort(held.txid),
            Err(ProposalError::UnknownProposal(_))
        ));
    }

    #[test]
    fn unknown_txid_is_reported() {
        let (_store, _ledger, proposals) = setup();
        let bogus = TxId::from_bytes([0xAA; 32]);
        assert!(matches!(
            proposals.commit(bogus),
            Err(ProposalError::UnknownProposal(_))
        ));
        assert!(matches!(
            proposals.abort(bogus),
            Err(ProposalError::UnknownProposal(_))
        ));
    }

    #[test]
    fn held_proposals_pin_their_inputs() {
        let (store, _ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let first = proposals.propose(&[(dest(), 30_000)]).unwrap();

        // The only input is reserved, so a second payment cannot fund.
        let err = proposals.propose(&[(dest(), 10_000)]).unwrap_err();
        assert!(matches!(
            err,
            ProposalError::Build(BuildError::InsufficientFunds { .. })
        ));

        // After abort the funds are usable again.
        proposals.abort(first.txid).unwrap();
        proposals.propose(&[(dest(), 10_000)]).unwrap();
    }

    #[test]
    fn failed_broadcast_leaves_the_proposal_held() {
        struct BroadcastFails(MemoryWalletStore);

        impl WalletStore for BroadcastFails {
            fn all_unspent(&self) -> Result<Vec<Utxo>, StoreError> {
                self.0.all_unspent()
            }
            fn mark_spent(&self, outpoints: &[Outpoint]) -> Result<(), StoreError> {
                self.0.mark_spent(outpoints)
            }
            fn sign_and_build(
                &self,
                inputs: &[Utxo],
                outputs: &[TxOutput],
                fee: u64,
            ) -> Result<SignedTx, StoreError> {
                self.0.sign_and_build(inputs, outputs, fee)
            }
            fn broadcast(&self, _tx: &SignedTx) -> Result<(), StoreError> {
                Err(StoreError::Broadcast("wire is down".to_string()))
            }
            fn fresh_address(&self) -> Result<Address, StoreError> {
                self.0.fresh_address()
            }
        }

        let inner = MemoryWalletStore::new(NETWORK_ID_DEVNET);
        inner.seed_utxo(60_000, 10);
        let store: Arc<dyn WalletStore> = Arc::new(BroadcastFails(inner));
        let ledger = Arc::new(LedgerView::new(store.clone()));
        let builder = TxBuilder::new(
            store.clone(),
            ledger.clone(),
            NETWORK_ID_DEVNET,
            BuilderConfig::default(),
        );
        let proposals = ProposalStore::new(builder, store, ledger.clone());

        let held = proposals.propose(&[(dest(), 30_000)]).unwrap();
        let err = proposals.commit(held.txid).unwrap_err();
        assert!(matches!(err, ProposalError::Store(StoreError::Broadcast(_))));

        // Still held, still reserved: the caller decides retry vs abort.
        assert_eq!(proposals.get(held.txid).unwrap().state, ProposalState::Held);
        assert_eq!(ledger.reserved_count(), 1);

        proposals.abort(held.txid).unwrap();
        assert_eq!(ledger.reserved_count(), 0);
    }

    #[test]
    fn pay_is_propose_plus_commit() {
        let (store, ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);

        let paid = proposals.pay(&[(dest(), 30_000)]).unwrap();
        assert_eq!(paid.state, ProposalState::Broadcast);
        assert_eq!(store.broadcast_count(), 1);
        assert_eq!(ledger.reserved_count(), 0);
        assert_eq!(proposals.pending_count(), 0);
    }

    #[test]
    fn held_listing_is_oldest_first() {
        let (store, _ledger, proposals) = setup();
        store.seed_utxo(60_000, 10);
        store.seed_utxo(60_000, 11);
        store.seed_utxo(60_000, 12);

        let a = proposals.propose(&[(dest(), 30_000)]).unwrap();
        let b = proposals.propose(&[(dest(), 30_000)]).unwrap();
        let c = proposals.propose(&[(dest(), 30_000)]).unwrap();
        proposals.abort(b.txid).unwrap();

        let pending = proposals.pending();
        let txids: Vec<TxId> = pending.iter().map(|p| p.txid).collect();
        assert_eq!(txids, vec![a.txid, c.txid]);
        assert_eq!(proposals.pending_count(), 2);
    }
}
