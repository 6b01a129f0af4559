//! # Vesper Addresses
//!
//! A Vesper address is a Bech32-encoded 20-byte witness program with a
//! network-specific human-readable prefix:
//!
//! ```text
//! program (20 bytes)
//!     -> Bech32(hrp_for_network, program) -> vsp1qw508d6qe...
//! ```
//!
//! The HRP makes addresses immediately recognizable and stops a testnet
//! address from being pasted into a mainnet payment form. Bech32 encoding
//! provides built-in error detection (up to 4 character errors), which
//! matters when users are copy-pasting addresses by hand.

use crate::config::{hrp_for_network, ADDRESS_PROGRAM_LENGTH};
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("wrong network: expected HRP '{expected}', got '{got}'")]
    WrongNetwork {
        /// The HRP of the active network.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded data has an unexpected length.
    #[error("invalid witness program length: expected {expected} bytes, got {got}")]
    InvalidProgramLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },

    /// The network ID is not one of mainnet/testnet/devnet.
    #[error("unknown network id: 0x{0:08X}")]
    UnknownNetwork(u32),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A Vesper payment address: a 20-byte program bound to a network.
///
/// # Examples
///
/// ```
/// use vesper_protocol::config::NETWORK_ID_DEVNET;
/// use vesper_protocol::wallet::Address;
///
/// let addr = Address::new(NETWORK_ID_DEVNET, [7u8; 20]).unwrap();
/// let encoded = addr.encode();
/// assert!(encoded.starts_with("dvsp1"));
///
/// let decoded = Address::decode(&encoded, NETWORK_ID_DEVNET).unwrap();
/// assert_eq!(addr, decoded);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    network_id: u32,
    program: [u8; ADDRESS_PROGRAM_LENGTH],
}

impl Address {
    /// Create an address from a network ID and raw program bytes.
    ///
    /// Fails when the network ID is not a known Vesper network.
    pub fn new(network_id: u32, program: [u8; ADDRESS_PROGRAM_LENGTH]) -> Result<Self, AddressError> {
        if hrp_for_network(network_id).is_none() {
            return Err(AddressError::UnknownNetwork(network_id));
        }
        Ok(Self {
            network_id,
            program,
        })
    }

    /// Encode this address as a Bech32 string.
    pub fn encode(&self) -> String {
        let hrp_str = hrp_for_network(self.network_id)
            .expect("network id validated at construction");
        let hrp = Hrp::parse(hrp_str).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.program)
            .expect("encoding a 20-byte payload should never fail")
    }

    /// Parse a Bech32-encoded address, validating it belongs to the given
    /// network.
    ///
    /// Validates the checksum, the HRP, and the program length. This is the
    /// gate every destination in a funding request passes through before the
    /// builder spends a single mote toward it.
    pub fn decode(addr: &str, network_id: u32) -> Result<Self, AddressError> {
        let expected_hrp =
            hrp_for_network(network_id).ok_or(AddressError::UnknownNetwork(network_id))?;

        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        if hrp.as_str() != expected_hrp {
            return Err(AddressError::WrongNetwork {
                expected: expected_hrp.to_string(),
                got: hrp.to_string(),
            });
        }

        if data.len() != ADDRESS_PROGRAM_LENGTH {
            return Err(AddressError::InvalidProgramLength {
                expected: ADDRESS_PROGRAM_LENGTH,
                got: data.len(),
            });
        }

        let mut program = [0u8; ADDRESS_PROGRAM_LENGTH];
        program.copy_from_slice(&data);

        Ok(Self {
            network_id,
            program,
        })
    }

    /// The network this address belongs to.
    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    /// The raw 20-byte witness program.
    pub fn program(&self) -> &[u8; ADDRESS_PROGRAM_LENGTH] {
        &self.program
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use crate::config::{NETWORK_ID_DEVNET, NETWORK_ID_MAINNET, NETWORK_ID_TESTNET};

        let s = String::deserialize(deserializer)?;
        // The HRP already names the network, so try each known one.
        for network_id in [NETWORK_ID_MAINNET, NETWORK_ID_TESTNET, NETWORK_ID_DEVNET] {
            if let Ok(addr) = Address::decode(&s, network_id) {
                return Ok(addr);
            }
        }
        Err(serde::de::Error::custom(format!(
            "'{}' is not a valid vesper address",
            s
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
