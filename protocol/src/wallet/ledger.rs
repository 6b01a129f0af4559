//! # UTXO Ledger View
//!
//! A read-mostly view over the wallet store's spendable outputs, plus the
//! one piece of state the payment layer owns itself: the set of outpoints
//! currently reserved by held proposals and in-flight sweeps.
//!
//! ## Design
//!
//! - Outputs are queried fresh from the store on every call. The view never
//!   caches, so committed spends disappear without cache invalidation.
//! - The reservation set lives behind a `parking_lot::Mutex`. Selection
//!   holds the lock across the fetch-filter-reserve sequence, so two
//!   concurrent proposals can never both reserve the same outpoint.
//! - Enumeration (`all_unspent`, `balance`) includes reserved outputs --
//!   they are still unspent. Selection excludes them.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::{StoreError, WalletStore};
use super::types::{Outpoint, Utxo};

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Wallet balance in motes, split by confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Sum over every unspent output.
    pub total: u64,

    /// Sum over outputs with at least one confirmation.
    pub confirmed: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from ledger selection.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The store failed underneath us.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Eligible outputs do not cover the requested amount.
    #[error("insufficient funds: need {needed} motes, {available} available")]
    InsufficientFunds {
        /// Amount the selection had to reach (including fee).
        needed: u64,
        /// Total value of eligible, unreserved outputs.
        available: u64,
    },
}

// ---------------------------------------------------------------------------
// LedgerView
// ---------------------------------------------------------------------------

/// The payment layer's window onto spendable value.
pub struct LedgerView {
    store: Arc<dyn WalletStore>,
    reserved: Mutex<HashSet<Outpoint>>,
}

impl LedgerView {
    /// Create a view over the given store with an empty reservation set.
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self {
            store,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Every unspent output, reserved ones included, sorted
    /// largest-value-first for stable display.
    pub fn all_unspent(&self) -> Result<Vec<Utxo>, StoreError> {
        let mut utxos = self.store.all_unspent()?;
        utxos.sort_by(|a, b| b.value.cmp(&a.value));
        Ok(utxos)
    }

    /// Total and confirmed balance over every unspent output.
    pub fn balance(&self) -> Result<Balance, StoreError> {
        let utxos = self.store.all_unspent()?;
        let total = utxos.iter().map(|u| u.value).sum();
        let confirmed = utxos
            .iter()
            .filter(|u| u.is_confirmed())
            .map(|u| u.value)
            .sum();
        Ok(Balance { total, confirmed })
    }

    /// Select outputs summing to at least `target` motes and atomically
    /// reserve them.
    ///
    /// Confirmed outputs are taken first, unconfirmed only when the
    /// confirmed set cannot cover the target; within each class, largest
    /// value first. The reservation lock is held across the whole
    /// fetch-select-reserve sequence, so concurrent callers never overlap.
    ///
    /// The caller owns the returned reservation: release it via
    /// [`release`](Self::release) on failure or abort, or let the outpoints
    /// be marked spent on commit.
    pub fn select_and_reserve(&self, target: u64) -> Result<Vec<Utxo>, LedgerError> {
        let mut reserved = self.reserved.lock();
        let utxos = self.store.all_unspent()?;

        let mut confirmed = Vec::new();
        let mut unconfirmed = Vec::new();
        for utxo in utxos {
            if reserved.contains(&utxo.outpoint) {
                continue;
            }
            if utxo.is_confirmed() {
                confirmed.push(utxo);
            } else {
                unconfirmed.push(utxo);
            }
        }
        confirmed.sort_by(|a, b| b.value.cmp(&a.value));
        unconfirmed.sort_by(|a, b| b.value.cmp(&a.value));

        let available: u64 = confirmed
            .iter()
            .chain(unconfirmed.iter())
            .map(|u| u.value)
            .sum();

        let mut selected = Vec::new();
        let mut gathered: u64 = 0;
        for utxo in confirmed.into_iter().chain(unconfirmed) {
            if gathered >= target {
                break;
            }
            gathered += utxo.value;
            selected.push(utxo);
        }

        if gathered < target {
            return Err(LedgerError::InsufficientFunds {
                needed: target,
                available,
            });
        }

        for utxo in &selected {
            reserved.insert(utxo.outpoint);
        }
        Ok(selected)
    }

    /// Select up to `max_count` confirmed outputs with value strictly above
    /// `min_value`, largest first, and atomically reserve them.
    ///
    /// Returns fewer than `max_count` (possibly none) when the wallet runs
    /// out of eligible outputs; that is not an error.
    pub fn reserve_for_sweep(
        &self,
        min_value: u64,
        max_count: usize,
    ) -> Result<Vec<Utxo>, StoreError> {
        let mut reserved = self.reserved.lock();
        let utxos = self.store.all_unspent()?;

        let mut eligible: Vec<Utxo> = utxos
            .into_iter()
            .filter(|u| u.is_confirmed() && u.value > min_value && !reserved.contains(&u.outpoint))
            .collect();
        eligible.sort_by(|a, b| b.value.cmp(&a.value));
        eligible.truncate(max_count);

        for utxo in &eligible {
            reserved.insert(utxo.outpoint);
        }
        Ok(eligible)
    }

    /// Return reserved outpoints to the available pool.
    pub fn release(&self, outpoints: &[Outpoint]) {
        let mut reserved = self.reserved.lock();
        for outpoint in outpoints {
            reserved.remove(outpoint);
        }
    }

    /// True when the outpoint is currently reserved.
    pub fn is_reserved(&self, outpoint: &Outpoint) -> bool {
        self.reserved.lock().contains(outpoint)
    }

    /// Number of currently reserved outpoints.
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NETWORK_ID_DEVNET;
    use crate::wallet::store::MemoryWalletStore;

    fn setup() -> (Arc<MemoryWalletStore>, LedgerView) {
        let store = Arc::new(MemoryWalletStore::new(NETWORK_ID_DEVNET));
        let ledger = LedgerView::new(store.clone());
        (store, ledger)
    }

    #[test]
    fn balance_splits_confirmed_from_total() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 120);
        store.seed_utxo(30_000, 77);
        store.seed_utxo(9_000, 0);

        let balance = ledger.balance().unwrap();
        assert_eq!(balance.total, 89_000);
        assert_eq!(balance.confirmed, 80_000);
    }

    #[test]
    fn all_unspent_is_sorted_largest_first() {
        let (store, ledger) = setup();
        store.seed_utxo(5_000, 1);
        store.seed_utxo(50_000, 1);
        store.seed_utxo(20_000, 0);

        let values: Vec<u64> = ledger.all_unspent().unwrap().iter().map(|u| u.value).collect();
        assert_eq!(values, vec![50_000, 20_000, 5_000]);
    }

    #[test]
    fn sweep_selection_wants_confirmed_above_threshold() {
        let (store, ledger) = setup();
        store.seed_utxo(20_000, 50);
        store.seed_utxo(15_000, 51);
        store.seed_utxo(10_000, 52); // exactly the threshold: excluded
        store.seed_utxo(90_000, 0); // unconfirmed: excluded

        let selected = ledger.reserve_for_sweep(10_000, 16).unwrap();
        let values: Vec<u64> = selected.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![20_000, 15_000]);
    }

    #[test]
    fn sweep_selection_skips_reserved() {
        let (store, ledger) = setup();
        store.seed_utxo(20_000, 50);
        store.seed_utxo(15_000, 51);

        let picked = ledger.select_and_reserve(16_000).unwrap();
        assert_eq!(picked[0].value, 20_000);

        let selected = ledger.reserve_for_sweep(10_000, 16).unwrap();
        let values: Vec<u64> = selected.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![15_000]);
    }

    #[test]
    fn selection_prefers_confirmed_largest_first() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);
        store.seed_utxo(30_000, 11);
        store.seed_utxo(5_000, 12);
        store.seed_utxo(80_000, 0); // unconfirmed must not be touched

        let selected = ledger.select_and_reserve(60_000).unwrap();
        let values: Vec<u64> = selected.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![50_000, 30_000]);
    }

    #[test]
    fn selection_spills_to_unconfirmed_when_needed() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);
        store.seed_utxo(40_000, 0);
        store.seed_utxo(30_000, 0);

        let selected = ledger.select_and_reserve(80_000).unwrap();
        let values: Vec<u64> = selected.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![50_000, 40_000]);
    }

    #[test]
    fn selection_reports_available_on_shortfall() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);

        let err = ledger.select_and_reserve(60_000).unwrap_err();
        match err {
            LedgerError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 60_000);
                assert_eq!(available, 50_000);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn reserved_outputs_cannot_be_selected_twice() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);

        let first = ledger.select_and_reserve(40_000).unwrap();
        assert_eq!(first.len(), 1);
        assert!(ledger.is_reserved(&first[0].outpoint));

        // The only output is reserved, so a second selection must starve.
        let err = ledger.select_and_reserve(40_000).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { available: 0, .. }
        ));
    }

    #[test]
    fn release_returns_outputs_to_the_pool() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);

        let picked = ledger.select_and_reserve(40_000).unwrap();
        let outpoints: Vec<_> = picked.iter().map(|u| u.outpoint).collect();
        ledger.release(&outpoints);
        assert_eq!(ledger.reserved_count(), 0);

        // Selectable again.
        assert!(ledger.select_and_reserve(40_000).is_ok());
    }

    #[test]
    fn reserve_for_sweep_caps_the_count() {
        let (store, ledger) = setup();
        store.seed_utxo(40_000, 3);
        store.seed_utxo(30_000, 4);
        store.seed_utxo(20_000, 5);

        let picked = ledger.reserve_for_sweep(10_000, 2).unwrap();
        let values: Vec<u64> = picked.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![40_000, 30_000]);
        assert_eq!(ledger.reserved_count(), 2);
    }

    #[test]
    fn reserve_for_sweep_with_nothing_eligible_is_empty_not_error() {
        let (store, ledger) = setup();
        store.seed_utxo(5_000, 3);

        let picked = ledger.reserve_for_sweep(10_000, 4).unwrap();
        assert!(picked.is_empty());
        assert_eq!(ledger.reserved_count(), 0);
    }

    #[test]
    fn enumeration_still_sees_reserved_outputs() {
        let (store, ledger) = setup();
        store.seed_utxo(50_000, 10);
        ledger.select_and_reserve(40_000).unwrap();

        // Reserved is not spent: balance and enumeration include it.
        assert_eq!(ledger.balance().unwrap().total, 50_000);
        assert_eq!(ledger.all_unspent().unwrap().len(), 1);
    }
}
