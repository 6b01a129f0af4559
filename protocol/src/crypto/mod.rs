//! # Cryptographic Primitives for Vesper
//!
//! This module is the foundation of everything security-related in the node.
//! Every signing operation and every hash flows through here.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for signatures -- fast, deterministic, and nobody has broken it.
//! - **SHA-256** for hashing -- because the rest of the world speaks it.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider. Then reconsider again. Then go read about timing attacks
//! and come back when you've lost the urge.

pub mod hash;
pub mod keys;

// Re-export the things people actually need so they don't have to memorize
// our module hierarchy. Life's too short for five levels of `use` statements.
pub use hash::{double_sha256, sha256, sha256_array};
pub use keys::{VesperKeypair, VesperPublicKey, VesperSignature};
