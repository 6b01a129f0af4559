//! # Identity Module
//!
//! Node identity for the Vesper network. Every node is identified by an
//! Ed25519 keypair, from which we derive a compact 16-byte fingerprint
//! (hex-rendered, pinnable, hard to fat-finger).
//!
//! The identity stack is layered:
//!
//! 1. **Keypair** -- Raw Ed25519 key material. Signs things, proves ownership.
//! 2. **Fingerprint** -- Truncated SHA-256 of the public key. This is what
//!    operators see, share, and paste into connect strings.
//!
//! ## Design Decisions
//!
//! - Ed25519 was chosen for its speed, small key/signature sizes, and
//!   resistance to timing side-channels. We use the `ed25519-dalek` crate
//!   (RFC 8032 compliant).
//! - Fingerprints truncate to 16 bytes. The secure channel authenticates
//!   the full public key on every connection; the fingerprint only pins
//!   which key we expected to see.

pub mod fingerprint;
pub mod keypair;

pub use fingerprint::{Fingerprint, FingerprintError};
pub use keypair::{VesperKeypair, VesperPublicKey, VesperSignature};
