//! # Wallet Module -- Outputs, Selection, and Spend Construction
//!
//! Everything between "I have coins" and "a signed transaction left the
//! building" lives here. The module is deliberately layered so that each
//! piece can be reasoned about (and tested) alone:
//!
//! ```text
//! types.rs     -- TxId, Outpoint, Utxo, TxOutput, SignedTx
//! address.rs   -- Bech32 addresses bound to a network id
//! store.rs     -- WalletStore trait + in-memory implementation
//! ledger.rs    -- spendable view with atomic reservation
//! builder.rs   -- payment / sweep / fan-out construction
//! proposal.rs  -- hold, inspect, commit-or-abort lifecycle
//! ```
//!
//! ## Design Principles
//!
//! 1. **All values are `u64` motes.** No floating point anywhere near
//!    money. Display formatting is somebody else's problem.
//!
//! 2. **Reservation is the concurrency story.** Two tasks building
//!    payments at once never see the same output: `LedgerView` filters,
//!    selects, and reserves under one lock.
//!
//! 3. **Nothing broadcasts implicitly.** Payments are held as proposals
//!    until an explicit commit; only sweep and fan-out (operator-initiated
//!    housekeeping) go straight to the wire.

pub mod address;
pub mod builder;
pub mod ledger;
pub mod proposal;
pub mod store;
pub mod types;

pub use address::{Address, AddressError};
pub use builder::{BuildError, BuilderConfig, TxBuilder};
pub use ledger::{Balance, LedgerError, LedgerView};
pub use proposal::{Proposal, ProposalError, ProposalState, ProposalStore};
pub use store::{MemoryWalletStore, StoreError, WalletStore};
pub use types::{Outpoint, SignedTx, TxId, TxOutput, Utxo};
