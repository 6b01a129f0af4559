//! Re-exports of the core cryptographic key types for the identity layer.
//!
//! The canonical implementations live in [`crate::crypto::keys`]. This module
//! re-exports them under `identity::keypair` so that higher-level code can
//! import identity-related types from a single namespace.

pub use crate::crypto::keys::{VesperKeypair, VesperPublicKey, VesperSignature};
