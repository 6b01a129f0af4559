//! # Wallet Data Types
//!
//! The value vocabulary of the payment layer: transaction IDs, outpoints,
//! unspent outputs, and the signed-transaction envelope the wallet store
//! produces. Everything here is plain data; behaviour lives in the ledger
//! view, the builder, and the proposal store.

use crate::crypto::hash::double_sha256_array;
use crate::crypto::keys::VesperSignature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// A transaction identifier: `double_sha256(signable_bytes)`, 32 bytes.
///
/// Rendered as 64 lowercase hex characters. Stable across signing -- the
/// ID commits to inputs, outputs, and fee, never to the signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded representation. 64 characters for 32 bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded transaction ID.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl FromStr for TxId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &self.to_hex()[..16])
    }
}

impl Serialize for TxId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            TxId::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            if bytes.len() != 32 {
                return Err(serde::de::Error::custom(format!(
                    "expected 32-byte txid, got {}",
                    bytes.len()
                )));
            }
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            Ok(TxId(arr))
        }
    }
}

// ---------------------------------------------------------------------------
// Outpoint
// ---------------------------------------------------------------------------

/// A reference to a specific output of a prior transaction.
///
/// The unit of spendable value: reservation, selection, and spent-marking
/// all operate on outpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    /// The transaction that created the output.
    pub txid: TxId,

    /// Index of the output within that transaction.
    pub index: u32,
}

impl Outpoint {
    /// Construct a new outpoint.
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

// ---------------------------------------------------------------------------
// Utxo
// ---------------------------------------------------------------------------

/// An unspent transaction output owned by the wallet.
///
/// `height == 0` means unconfirmed. The wallet store owns these; the ledger
/// view only reads them and tracks which outpoints are reserved by held
/// proposals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Where this output lives on chain.
    pub outpoint: Outpoint,

    /// Value in motes.
    pub value: u64,

    /// Confirmation height. `0` = still in the mempool.
    pub height: u32,

    /// Key-derivation index within the wallet store. Opaque to everyone
    /// except the store that signs with it.
    pub path: u32,
}

impl Utxo {
    /// Returns `true` once the output has at least one confirmation.
    pub fn is_confirmed(&self) -> bool {
        self.height != 0
    }
}

// ---------------------------------------------------------------------------
// TxOutput
// ---------------------------------------------------------------------------

/// A single output of a transaction under construction: destination address
/// (Bech32 string) and value in motes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Bech32-encoded destination address.
    pub address: String,

    /// Value in motes.
    pub value: u64,
}

impl TxOutput {
    /// Construct a new output.
    pub fn new(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// SignedTx
// ---------------------------------------------------------------------------

/// A fully built, signed transaction ready for broadcast.
///
/// The `txid` is the double-SHA-256 hash of [`SignedTx::signable_bytes`],
/// which commits to inputs, outputs, and fee but *not* to the signature.
/// You can compute the ID before signing and it will not change afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// `double_sha256(signable_bytes)`.
    pub txid: TxId,

    /// The outpoints this transaction consumes.
    pub inputs: Vec<Outpoint>,

    /// Outputs in construction order: requested destinations first, change
    /// (if any) last.
    pub outputs: Vec<TxOutput>,

    /// Fee in motes: input value minus output value.
    pub fee: u64,

    /// Ed25519 signature over [`SignedTx::signable_bytes`].
    pub signature: VesperSignature,
}

impl SignedTx {
    /// Returns the canonical byte representation used for signing and ID
    /// computation.
    ///
    /// The format is a deterministic concatenation of fields with null-byte
    /// separators and fixed-width little-endian integers. JSON/serde is
    /// intentionally avoided because field ordering is not guaranteed across
    /// serialization formats.
    pub fn signable_bytes(inputs: &[Outpoint], outputs: &[TxOutput], fee: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + inputs.len() * 36 + outputs.len() * 48);

        // Input count, then each outpoint as txid bytes + LE index.
        buf.extend_from_slice(&(inputs.len() as u32).to_le_bytes());
        for input in inputs {
            buf.extend_from_slice(input.txid.as_bytes());
            buf.extend_from_slice(&input.index.to_le_bytes());
        }

        // Output count, then each output as address string + LE value.
        buf.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
        for output in outputs {
            buf.extend_from_slice(output.address.as_bytes());
            buf.push(0x00);
            buf.extend_from_slice(&output.value.to_le_bytes());
        }

        // Fee as little-endian u64.
        buf.extend_from_slice(&fee.to_le_bytes());

        buf
    }

    /// Computes the transaction ID for the given contents.
    ///
    /// Deterministic and independent of signature state.
    pub fn compute_txid(inputs: &[Outpoint], outputs: &[TxOutput], fee: u64) -> TxId {
        TxId(double_sha256_array(&Self::signable_bytes(
            inputs, outputs, fee,
        )))
    }

    /// Sum of all output values in motes.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
