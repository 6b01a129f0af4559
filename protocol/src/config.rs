//! # Protocol Configuration & Constants
//!
//! Every magic number in Vesper lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define the DNA of the network. Changing them after mainnet
//! launch is somewhere between "difficult" and "career-ending", so choose
//! wisely during devnet.

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet -- the real deal. Mistakes here cost real money.
pub const NETWORK_ID_MAINNET: u32 = 0x56455350; // "VESP" in ASCII hex. Yes, we're that cute.

/// Testnet -- where we break things on purpose and call it "testing."
pub const NETWORK_ID_TESTNET: u32 = 0x56455354; // "VEST"

/// Devnet -- the wild west. Reset weekly, no promises, no survivors.
pub const NETWORK_ID_DEVNET: u32 = 0x56455344; // "VESD"

/// Human-readable network prefixes for addresses.
/// Bech32 HRP values -- short enough to type, long enough to be unambiguous.
pub const MAINNET_HRP: &str = "vsp";
pub const TESTNET_HRP: &str = "tvsp";
pub const DEVNET_HRP: &str = "dvsp";

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string, assembled at compile time so we don't allocate
/// for something this trivial at runtime.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 -- the only sane choice for signatures in 2024+.
/// 128-bit security level, deterministic, and resistant to side-channel
/// attacks when implemented correctly (which ed25519-dalek is).
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Signing key length in bytes. Ed25519 secret keys are 32 bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes. If yours isn't, something
/// has gone terribly wrong.
pub const SIGNATURE_LENGTH: usize = 64;

/// Hash output length in bytes. SHA-256 produces 32-byte digests.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Peer fingerprint length in bytes: SHA-256 over the serialized public key,
/// truncated. 16 bytes (128 bits) is plenty to pin an identity and short
/// enough to paste into a connect string without tears.
pub const FINGERPRINT_LENGTH: usize = 16;

/// Witness-program length inside an address. 20 bytes, hash160-sized.
pub const ADDRESS_PROGRAM_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Wire Message Tags
// ---------------------------------------------------------------------------

/// Text chat message. Payload is UTF-8 text, nothing more.
pub const MSG_TEXT_CHAT: u8 = 0x60;

/// First tag of the channel-protocol family. Payloads in this range are
/// opaque to the session layer and handed to the channel handler untouched.
pub const CHANNEL_TAG_START: u8 = 0x70;

/// Last tag of the channel-protocol family (inclusive).
pub const CHANNEL_TAG_END: u8 = 0x7F;

// ---------------------------------------------------------------------------
// Value & Fee Parameters
// ---------------------------------------------------------------------------

/// Motes per VSP. 8 decimals, same as Bitcoin. We're not reinventing
/// this wheel.
pub const MOTES_PER_VSP: u64 = 100_000_000;

/// Dust floor in motes (the smallest unit, because every payment network
/// needs a cute name for its smallest denomination). Outputs below this
/// cost more to spend than they're worth.
pub const DUST_FLOOR_MOTES: u64 = 1_000;

/// Sweep value floor in motes. A sweep only bothers with confirmed outputs
/// strictly above this; consolidating anything smaller burns the value in fees.
pub const SWEEP_VALUE_FLOOR_MOTES: u64 = 10_000;

/// Flat per-transaction fee in motes. Devnet-grade fee model; a real fee
/// estimator slots in behind [`crate::wallet::BuilderConfig`] later.
pub const FLAT_FEE_MOTES: u64 = 8_000;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default peer listening port.
pub const DEFAULT_PEER_PORT: u16 = 2448;

/// Capacity of the node event broadcast channel. Slow subscribers start
/// seeing `Lagged` past this depth; they asked for it.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns the human-readable prefix for a given network ID.
/// Returns `None` for unrecognized networks -- we don't guess.
pub fn hrp_for_network(network_id: u32) -> Option<&'static str> {
    match network_id {
        NETWORK_ID_MAINNET => Some(MAINNET_HRP),
        NETWORK_ID_TESTNET => Some(TESTNET_HRP),
        NETWORK_ID_DEVNET => Some(DEVNET_HRP),
        _ => None,
    }
}

/// Returns a friendly name for a network ID, mainly for logging.
/// Unknown networks get a hex dump because we're helpful like that.
pub fn network_name(network_id: u32) -> String {
    match network_id {
        NETWORK_ID_MAINNET => "mainnet".to_string(),
        NETWORK_ID_TESTNET => "testnet".to_string(),
        NETWORK_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

/// True when `tag` belongs to the channel-protocol family.
pub fn is_channel_tag(tag: u8) -> bool {
    (CHANNEL_TAG_START..=CHANNEL_TAG_END).contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_ids_are_distinct() {
        // If these collide, someone has been editing hex while sleep-deprived.
        assert_ne!(NETWORK_ID_MAINNET, NETWORK_ID_TESTNET);
        assert_ne!(NETWORK_ID_MAINNET, NETWORK_ID_DEVNET);
        assert_ne!(NETWORK_ID_TESTNET, NETWORK_ID_DEVNET);
    }

    #[test]
    fn test_network_ids_are_valid_ascii() {
        // Each ID should decode to a readable 4-char ASCII tag.
        for id in [NETWORK_ID_MAINNET, NETWORK_ID_TESTNET, NETWORK_ID_DEVNET] {
            let bytes = id.to_be_bytes();
            assert!(bytes.iter().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_hrp_for_known_networks() {
        assert_eq!(hrp_for_network(NETWORK_ID_MAINNET), Some("vsp"));
        assert_eq!(hrp_for_network(NETWORK_ID_TESTNET), Some("tvsp"));
        assert_eq!(hrp_for_network(NETWORK_ID_DEVNET), Some("dvsp"));
    }

    #[test]
    fn test_hrp_for_unknown_network() {
        assert_eq!(hrp_for_network(0xDEADBEEF), None);
    }

    #[test]
    fn test_network_name_formatting() {
        assert_eq!(network_name(NETWORK_ID_MAINNET), "mainnet");
        assert_eq!(network_name(0xCAFEBABE), "unknown(0xCAFEBABE)");
    }

    #[test]
    fn test_value_constants_sanity() {
        // Dust below sweep floor below a whole coin. Obvious, but stranger
        // things have shipped to production.
        assert!(DUST_FLOOR_MOTES < SWEEP_VALUE_FLOOR_MOTES);
        assert!(SWEEP_VALUE_FLOOR_MOTES < MOTES_PER_VSP);
        assert!(FLAT_FEE_MOTES > 0);
    }

    #[test]
    fn test_channel_tag_range() {
        assert!(is_channel_tag(CHANNEL_TAG_START));
        assert!(is_channel_tag(CHANNEL_TAG_END));
        assert!(is_channel_tag(0x77));
        assert!(!is_channel_tag(MSG_TEXT_CHAT));
        assert!(!is_channel_tag(0x80));
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(SIGNING_KEY_LENGTH, 32);
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
        assert!(FINGERPRINT_LENGTH < HASH_OUTPUT_LENGTH);
    }
}
