//! # Peer Fingerprints
//!
//! A fingerprint is the compact wire identity of a Vesper node. It is
//! derived from the node's Ed25519 public key by hashing and truncating:
//!
//! ```text
//! public_key (32 bytes)
//!     -> SHA-256(public_key) -> 32 bytes
//!     -> first 16 bytes -> a41f...0c2e (32 hex chars)
//! ```
//!
//! 16 bytes is enough to pin a peer's identity across reconnects and short
//! enough to live in a connect string (`<fingerprint>@host:port`). The full
//! public key still travels with every authenticated connection; the
//! fingerprint only has to *recognize* it, not replace it.

use crate::config::FINGERPRINT_LENGTH;
use crate::crypto::hash::sha256_array;
use crate::crypto::keys::VesperPublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing a fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The string was not valid hex.
    #[error("fingerprint hex decode error: {0}")]
    InvalidHex(String),

    /// The decoded data has an unexpected length.
    #[error("invalid fingerprint length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// A 16-byte peer identifier derived from an Ed25519 public key.
///
/// Rendered as 32 lowercase hex characters. Derivation is deterministic, so
/// the same key always produces the same fingerprint on every platform.
///
/// # Examples
///
/// ```
/// use vesper_protocol::crypto::keys::VesperKeypair;
/// use vesper_protocol::identity::Fingerprint;
///
/// let kp = VesperKeypair::generate();
/// let fp = Fingerprint::of(&kp.public_key());
/// let hex = fp.to_hex();
/// assert_eq!(hex.len(), 32);
///
/// let recovered: Fingerprint = hex.parse().unwrap();
/// assert_eq!(fp, recovered);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Derive the fingerprint of a public key.
    ///
    /// SHA-256 over the raw key bytes, truncated to the first 16 bytes.
    /// Truncation is safe here: we only need collision resistance at the
    /// "identify a peer" level, not a full 256-bit commitment.
    pub fn of(pk: &VesperPublicKey) -> Self {
        let digest = sha256_array(pk.as_bytes());
        let mut bytes = [0u8; FINGERPRINT_LENGTH];
        bytes.copy_from_slice(&digest[..FINGERPRINT_LENGTH]);
        Self(bytes)
    }

    /// Construct from raw bytes. No validation beyond the length in the type.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }

    /// Hex-encoded representation. 32 characters for 16 bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded fingerprint string.
    pub fn from_hex(s: &str) -> Result<Self, FingerprintError> {
        let bytes = hex::decode(s).map_err(|e| FingerprintError::InvalidHex(e.to_string()))?;
        if bytes.len() != FINGERPRINT_LENGTH {
            return Err(FingerprintError::InvalidLength {
                expected: FINGERPRINT_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; FINGERPRINT_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            if bytes.len() != FINGERPRINT_LENGTH {
                return Err(serde::de::Error::custom(format!(
                    "expected {}-byte fingerprint, got {}",
                    FINGERPRINT_LENGTH,
                    bytes.len()
                )));
            }
            let mut arr = [0u8; FINGERPRINT_LENGTH];
            arr.copy_from_slice(&bytes);
            Ok(Fingerprint(arr))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
