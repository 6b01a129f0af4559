//! # Transaction Builder
//!
//! Turns funding requests into signed transactions. Three construction
//! modes, one selection discipline:
//!
//! - **Payment** -- multi-output, goes through the proposal store so the
//!   caller can inspect before broadcast.
//! - **Sweep** -- up to N independent 1-input-1-output consolidations,
//!   broadcast immediately.
//! - **Fan-out** -- one transaction splitting value into N outputs of
//!   monotonically increasing value, broadcast immediately.
//!
//! Sweep and fan-out are deliberately fire-and-forget: they move value
//! between our own addresses (or to a destination the operator just typed),
//! so the inspect-then-commit window would be ceremony without safety.
//! Payments to third parties get the proposal treatment.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::address::Address;
use super::ledger::{LedgerError, LedgerView};
use super::proposal::Proposal;
use super::store::{StoreError, WalletStore};
use super::types::{Outpoint, SignedTx, TxId, TxOutput, Utxo};
use crate::config::{DUST_FLOOR_MOTES, FLAT_FEE_MOTES, SWEEP_VALUE_FLOOR_MOTES};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fee and threshold parameters for transaction construction.
///
/// Defaults come from the protocol constants and suit a devnet. A real fee
/// estimator would replace `flat_fee` with something market-aware; the
/// selection and reservation logic would not change.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Smallest output value worth creating, in motes.
    pub dust_floor: u64,

    /// Sweeps only consolidate confirmed outputs strictly above this value.
    pub sweep_floor: u64,

    /// Flat per-transaction fee in motes.
    pub flat_fee: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            dust_floor: DUST_FLOOR_MOTES,
            sweep_floor: SWEEP_VALUE_FLOOR_MOTES,
            flat_fee: FLAT_FEE_MOTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by transaction construction.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The request contained no destinations (or a zero count).
    #[error("funding request is empty")]
    EmptyRequest,

    /// A destination does not decode as an address on the active network.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending destination string.
        address: String,
        /// Why it failed to decode.
        reason: String,
    },

    /// A requested amount is below the dust floor.
    #[error("amount {amount} is below the dust floor of {floor} motes")]
    DustAmount {
        /// The offending amount.
        amount: u64,
        /// The configured dust floor.
        floor: u64,
    },

    /// Eligible inputs do not cover the requested total plus fee.
    #[error("insufficient funds: need {needed} motes, {available} available")]
    InsufficientFunds {
        /// Amount that had to be covered, fee included.
        needed: u64,
        /// Total value of eligible, unreserved outputs.
        available: u64,
    },

    /// Summing the requested amounts overflowed u64. Nobody has this much
    /// money, including you.
    #[error("requested amounts overflow")]
    AmountOverflow,

    /// The wallet store failed underneath us.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LedgerError> for BuildError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(e) => BuildError::Store(e),
            LedgerError::InsufficientFunds { needed, available } => {
                BuildError::InsufficientFunds { needed, available }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TxBuilder
// ---------------------------------------------------------------------------

/// Builds signed transactions over a [`LedgerView`] and a [`WalletStore`].
///
/// Cheap to clone; all state lives behind the shared ledger and store.
#[derive(Clone)]
pub struct TxBuilder {
    store: Arc<dyn WalletStore>,
    ledger: Arc<LedgerView>,
    network_id: u32,
    config: BuilderConfig,
}

impl TxBuilder {
    /// Create a builder for the given network.
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<LedgerView>,
        network_id: u32,
        config: BuilderConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            network_id,
            config,
        }
    }

    /// The fee and threshold parameters in effect.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build a multi-output payment and return it as a held proposal.
    ///
    /// The request is an ordered list of `(address, amount)` pairs. Every
    /// destination must decode on the active network and every amount must
    /// clear the dust floor. Inputs are selected confirmed-first,
    /// largest-first, and reserved atomically; the reservation travels with
    /// the returned proposal until commit or abort.
    ///
    /// Outputs preserve request order. Change (when above dust) is appended
    /// last, paying a fresh address from the store; sub-dust change rides
    /// along as extra fee.
    pub fn build_payment(&self, request: &[(String, u64)]) -> Result<Proposal, BuildError> {
        if request.is_empty() {
            return Err(BuildError::EmptyRequest);
        }

        let mut outputs = Vec::with_capacity(request.len() + 1);
        let mut total: u64 = 0;
        for (address, amount) in request {
            if let Err(e) = Address::decode(address, self.network_id) {
                return Err(BuildError::InvalidAddress {
                    address: address.clone(),
                    reason: e.to_string(),
                });
            }
            if *amount < self.config.dust_floor {
                return Err(BuildError::DustAmount {
                    amount: *amount,
                    floor: self.config.dust_floor,
                });
            }
            total = total
                .checked_add(*amount)
                .ok_or(BuildError::AmountOverflow)?;
            outputs.push(TxOutput::new(address.clone(), *amount));
        }

        let inputs = self.fund(total)?;
        let (tx, consumed) = self.finish(inputs, outputs, total)?;

        debug!(
            txid = %tx.txid,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = tx.fee,
            "payment built"
        );
        Ok(Proposal::held(tx, consumed))
    }

    /// Consolidate confirmed outputs into up to `max_txs` independent
    /// 1-input-1-output transactions to `destination`.
    ///
    /// Each transaction is broadcast immediately and its input marked
    /// spent; the returned txids are already on the wire. Stops early when
    /// eligible outputs run out -- an empty result is not an error.
    pub fn build_sweep(&self, destination: &str, max_txs: usize) -> Result<Vec<TxId>, BuildError> {
        if max_txs == 0 {
            return Err(BuildError::EmptyRequest);
        }
        self.check_destination(destination)?;

        // An output is only worth sweeping if, after the fee, it still
        // clears the dust floor. With default parameters the sweep floor
        // already guarantees that.
        let floor = self
            .config
            .sweep_floor
            .max(self.config.flat_fee + self.config.dust_floor);
        let candidates = self.ledger.reserve_for_sweep(floor, max_txs)?;
        if candidates.is_empty() {
            debug!(floor, "sweep found nothing to consolidate");
            return Ok(Vec::new());
        }

        let mut swept = Vec::with_capacity(candidates.len());
        for (i, utxo) in candidates.iter().enumerate() {
            let outputs = vec![TxOutput::new(
                destination,
                utxo.value - self.config.flat_fee,
            )];
            let built = self
                .store
                .sign_and_build(std::slice::from_ref(utxo), &outputs, self.config.flat_fee)
                .and_then(|tx| self.store.broadcast(&tx).map(|_| tx));

            let tx = match built {
                Ok(tx) => tx,
                Err(e) => {
                    // Nothing from this output onward went out; hand the
                    // remaining reservations back.
                    let leftover: Vec<Outpoint> =
                        candidates[i..].iter().map(|u| u.outpoint).collect();
                    self.ledger.release(&leftover);
                    return Err(e.into());
                }
            };

            if let Err(e) = self.store.mark_spent(&[utxo.outpoint]) {
                // The transaction is already on the wire; the store will
                // catch up when it sees the spend confirm.
                warn!(outpoint = %utxo.outpoint, error = %e, "spent-marking failed after broadcast");
            }
            self.ledger.release(&[utxo.outpoint]);

            info!(txid = %tx.txid, value = utxo.value, "sweep transaction broadcast");
            swept.push(tx.txid);
        }
        Ok(swept)
    }

    /// Split value into `num_outputs` outputs to `destination` with values
    /// `base_value, base_value+1, ..` in a single transaction, broadcast
    /// immediately.
    ///
    /// The strictly increasing values make every output distinguishable,
    /// which is the whole point when generating test traffic.
    pub fn build_fan_out(
        &self,
        destination: &str,
        num_outputs: u32,
        base_value: u64,
    ) -> Result<TxId, BuildError> {
        if num_outputs == 0 {
            return Err(BuildError::EmptyRequest);
        }
        self.check_destination(destination)?;
        if base_value < self.config.dust_floor {
            return Err(BuildError::DustAmount {
                amount: base_value,
                floor: self.config.dust_floor,
            });
        }

        let mut outputs = Vec::with_capacity(num_outputs as usize + 1);
        let mut total: u64 = 0;
        for i in 0..num_outputs {
            let value = base_value
                .checked_add(u64::from(i))
                .ok_or(BuildError::AmountOverflow)?;
            total = total.checked_add(value).ok_or(BuildError::AmountOverflow)?;
            outputs.push(TxOutput::new(destination, value));
        }

        let inputs = self.fund(total)?;
        let (tx, consumed) = self.finish(inputs, outputs, total)?;

        if let Err(e) = self.store.broadcast(&tx) {
            self.ledger.release(&consumed);
            return Err(e.into());
        }
        if let Err(e) = self.store.mark_spent(&consumed) {
            warn!(txid = %tx.txid, error = %e, "spent-marking failed after broadcast");
        }
        self.ledger.release(&consumed);

        info!(txid = %tx.txid, outputs = num_outputs, base_value, "fan-out broadcast");
        Ok(tx.txid)
    }

    fn check_destination(&self, destination: &str) -> Result<(), BuildError> {
        Address::decode(destination, self.network_id)
            .map(|_| ())
            .map_err(|e| BuildError::InvalidAddress {
                address: destination.to_string(),
                reason: e.to_string(),
            })
    }

    /// Select and reserve inputs covering `total` plus the flat fee.
    fn fund(&self, total: u64) -> Result<Vec<Utxo>, BuildError> {
        let target = total
            .checked_add(self.config.flat_fee)
            .ok_or(BuildError::AmountOverflow)?;
        Ok(self.ledger.select_and_reserve(target)?)
    }

    /// Attach change, sign, and return the transaction with its consumed
    /// outpoints. Releases the reservation on any failure.
    fn finish(
        &self,
        inputs: Vec<Utxo>,
        mut outputs: Vec<TxOutput>,
        total: u64,
    ) -> Result<(SignedTx, Vec<Outpoint>), BuildError> {
        let consumed: Vec<Outpoint> = inputs.iter().map(|u| u.outpoint).collect();
        let input_value: u64 = inputs.iter().map(|u| u.value).sum();

        // Selection guaranteed input_value >= total + flat_fee.
        let change = input_value - total - self.config.flat_fee;
        let fee = if change >= self.config.dust_floor {
            let change_addr = match self.store.fresh_address() {
                Ok(addr) => addr,
                Err(e) => {
                    self.ledger.release(&consumed);
                    return Err(e.into());
                }
            };
            outputs.push(TxOutput::new(change_addr.encode(), change));
            self.config.flat_fee
        } else {
            // Sub-dust change rides along as extra fee.
            self.config.flat_fee + change
        };

        match self.store.sign_and_build(&inputs, &outputs, fee) {
            Ok(tx) => Ok((tx, consumed)),
            Err(e) => {
                self.ledger.release(&consumed);
                Err(e.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
