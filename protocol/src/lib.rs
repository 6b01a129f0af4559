// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vesper Protocol -- Core Library
//!
//! The operational core of a Vesper payment node: authenticated peer
//! sessions on one side, a UTXO wallet that refuses to double-spend on the
//! other, and nothing in between pretending to be a blockchain. Chain sync,
//! SPV filtering, and the channel protocol proper live elsewhere; this
//! crate is the part that has to be right for any of those to matter.
//!
//! Vesper takes a pragmatic stance: Ed25519 identities (because we're not
//! barbarians), SHA-256 fingerprints truncated to 16 bytes (collision
//! resistance we can actually spend), and Bech32 addresses (typo detection
//! beats checksum prayers).
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! payment node:
//!
//! - **crypto** -- Ed25519 keys and the SHA-256 hash family. Don't roll
//!   your own.
//! - **identity** -- Fingerprints: who a peer is, in 16 bytes.
//! - **network** -- Sessions, dispatch, and the secure-channel seam.
//!   The handshake is somebody else's department.
//! - **wallet** -- Outputs, selection, reservation, and the
//!   propose/commit/abort state machine. The part that touches money.
//! - **node** -- The context object that owns all of the above. No
//!   globals. Ever.
//! - **config** -- Protocol constants and network parameters.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. Nothing broadcasts until someone explicitly says so.
//! 3. Every lock has a story; none of them outlive an await they
//!    shouldn't.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod network;
pub mod node;
pub mod wallet;

pub use crypto::keys::{VesperKeypair, VesperPublicKey, VesperSignature};
pub use identity::Fingerprint;
pub use node::{Node, NodeConfig, NodeError, NodeEvent};
