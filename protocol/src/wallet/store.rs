//! # Wallet Store
//!
//! The [`WalletStore`] trait is the seam between the payment-construction
//! layer and whatever actually holds keys and talks to the chain. The
//! builder and proposal store never touch key material or the network
//! directly; they ask the store to enumerate unspent outputs, sign
//! transactions, broadcast them, and mark outputs spent.
//!
//! [`MemoryWalletStore`] is the in-process implementation used by the
//! loopback mode, the demo, and the test suite. It mints synthetic UTXOs on
//! demand and records broadcasts instead of sending them anywhere, which is
//! exactly what you want on a devnet that resets weekly.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use super::address::Address;
use super::types::{Outpoint, SignedTx, TxId, TxOutput, Utxo};
use crate::crypto::hash::double_sha256_array;
use crate::crypto::keys::VesperKeypair;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a wallet store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transaction construction or signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The transaction could not be handed to the network layer.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// Anything else the backend wants to complain about.
    #[error("wallet backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// WalletStore trait
// ---------------------------------------------------------------------------

/// Storage, signing, and broadcast backend for the payment layer.
///
/// Implementations must be safe to call from multiple tasks; the ledger
/// view serializes selection around its own reservation lock but issues
/// reads and writes from whatever task the caller runs on.
pub trait WalletStore: Send + Sync {
    /// Every output the wallet can currently spend.
    ///
    /// Queried fresh on each call; the result reflects outputs already
    /// marked spent by committed proposals and fire-and-forget sends.
    fn all_unspent(&self) -> Result<Vec<Utxo>, StoreError>;

    /// Record the given outpoints as spent so they never appear in
    /// `all_unspent` again. Idempotent: unknown outpoints are ignored.
    fn mark_spent(&self, outpoints: &[Outpoint]) -> Result<(), StoreError>;

    /// Build and sign a transaction spending `inputs` into `outputs` with
    /// the given fee.
    ///
    /// The store owns the keys; callers never see secret material. The
    /// value equation `sum(inputs) == sum(outputs) + fee` must hold or the
    /// store refuses to sign.
    fn sign_and_build(
        &self,
        inputs: &[Utxo],
        outputs: &[TxOutput],
        fee: u64,
    ) -> Result<SignedTx, StoreError>;

    /// Hand a signed transaction to the network layer.
    ///
    /// Blocks until the transaction is accepted for relay, not until it
    /// confirms.
    fn broadcast(&self, tx: &SignedTx) -> Result<(), StoreError>;

    /// Mint a fresh receive address on the store's network.
    fn fresh_address(&self) -> Result<Address, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryWalletStore
// ---------------------------------------------------------------------------

struct StoreInner {
    /// Spendable outputs by outpoint.
    utxos: HashMap<Outpoint, Utxo>,

    /// Addresses this store has minted, mapped to their derivation path.
    /// Broadcast change to one of these comes straight back as a new
    /// unconfirmed output, the way a real wallet picks up its own change.
    minted: HashMap<String, u32>,

    /// Every transaction handed to `broadcast`, in order.
    broadcasts: Vec<SignedTx>,

    /// Next key-derivation index.
    next_path: u32,

    /// Counter for synthetic txids minted by `seed_utxo`.
    next_seed: u64,
}

/// An in-memory [`WalletStore`] for loopback nodes, demos, and tests.
///
/// Holds one Ed25519 keypair and signs everything with it. `seed_utxo`
/// conjures spendable value out of thin air; `broadcasts` lets tests
/// inspect exactly what would have hit the wire.
pub struct MemoryWalletStore {
    keypair: VesperKeypair,
    network_id: u32,
    inner: Mutex<StoreInner>,
}

impl MemoryWalletStore {
    /// Create an empty store with a freshly generated keypair.
    pub fn new(network_id: u32) -> Self {
        Self::with_keypair(VesperKeypair::generate(), network_id)
    }

    /// Create an empty store around an existing keypair.
    pub fn with_keypair(keypair: VesperKeypair, network_id: u32) -> Self {
        Self {
            keypair,
            network_id,
            inner: Mutex::new(StoreInner {
                utxos: HashMap::new(),
                minted: HashMap::new(),
                broadcasts: Vec::new(),
                next_path: 0,
                next_seed: 0,
            }),
        }
    }

    /// Conjure a spendable output of `value` motes at confirmation height
    /// `height` (0 = unconfirmed). Returns the synthetic outpoint.
    ///
    /// Devnet only, obviously. The txid is minted from a local counter, so
    /// seeded outputs never collide with each other or with real ones.
    pub fn seed_utxo(&self, value: u64, height: u32) -> Outpoint {
        let mut inner = self.inner.lock();
        let seed = inner.next_seed;
        inner.next_seed += 1;
        let path = inner.next_path;
        inner.next_path += 1;

        let mut preimage = Vec::with_capacity(12);
        preimage.extend_from_slice(b"seed");
        preimage.extend_from_slice(&seed.to_le_bytes());
        let outpoint = Outpoint::new(TxId::from_bytes(double_sha256_array(&preimage)), 0);

        inner.utxos.insert(
            outpoint,
            Utxo {
                outpoint,
                value,
                height,
                path,
            },
        );
        outpoint
    }

    /// Number of transactions broadcast so far.
    pub fn broadcast_count(&self) -> usize {
        self.inner.lock().broadcasts.len()
    }

    /// Snapshot of every broadcast transaction, in broadcast order.
    pub fn broadcasts(&self) -> Vec<SignedTx> {
        self.inner.lock().broadcasts.clone()
    }

    /// The public key this store signs with.
    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    fn mint_address(&self, inner: &mut StoreInner) -> Result<Address, StoreError> {
        let path = inner.next_path;
        inner.next_path += 1;

        // Program = first 20 bytes of SHA-256(pubkey || path). Deterministic
        // per (key, path), unique per path.
        let mut preimage = Vec::with_capacity(36);
        preimage.extend_from_slice(&self.keypair.public_key_bytes());
        preimage.extend_from_slice(&path.to_le_bytes());
        let digest = crate::crypto::hash::sha256_array(&preimage);
        let mut program = [0u8; crate::config::ADDRESS_PROGRAM_LENGTH];
        program.copy_from_slice(&digest[..crate::config::ADDRESS_PROGRAM_LENGTH]);

        let address = Address::new(self.network_id, program)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        inner.minted.insert(address.encode(), path);
        Ok(address)
    }
}

impl WalletStore for MemoryWalletStore {
    fn all_unspent(&self) -> Result<Vec<Utxo>, StoreError> {
        Ok(self.inner.lock().utxos.values().cloned().collect())
    }

    fn mark_spent(&self, outpoints: &[Outpoint]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        for outpoint in outpoints {
            inner.utxos.remove(outpoint);
        }
        Ok(())
    }

    fn sign_and_build(
        &self,
        inputs: &[Utxo],
        outputs: &[TxOutput],
        fee: u64,
    ) -> Result<SignedTx, StoreError> {
        if inputs.is_empty() {
            return Err(StoreError::Signing("no inputs".to_string()));
        }

        let input_value: u64 = inputs.iter().map(|u| u.value).sum();
        let output_value: u64 = outputs.iter().map(|o| o.value).sum();
        if input_value != output_value + fee {
            return Err(StoreError::Signing(format!(
                "value mismatch: inputs {} != outputs {} + fee {}",
                input_value, output_value, fee
            )));
        }

        let input_outpoints: Vec<Outpoint> = inputs.iter().map(|u| u.outpoint).collect();
        let signable = SignedTx::signable_bytes(&input_outpoints, outputs, fee);
        let signature = self.keypair.sign(&signable);

        Ok(SignedTx {
            txid: SignedTx::compute_txid(&input_outpoints, outputs, fee),
            inputs: input_outpoints,
            outputs: outputs.to_vec(),
            fee,
            signature,
        })
    }

    fn broadcast(&self, tx: &SignedTx) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        // Outputs paying one of our own addresses come back as fresh
        // unconfirmed outputs, exactly like change from a real broadcast.
        for (index, output) in tx.outputs.iter().enumerate() {
            if let Some(&path) = inner.minted.get(&output.address) {
                let outpoint = Outpoint::new(tx.txid, index as u32);
                inner.utxos.insert(
                    outpoint,
                    Utxo {
                        outpoint,
                        value: output.value,
                        height: 0,
                        path,
                    },
                );
            }
        }

        inner.broadcasts.push(tx.clone());
        Ok(())
    }

    fn fresh_address(&self) -> Result<Address, StoreError> {
        let mut inner = self.inner.lock();
        self.mint_address(&mut inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
