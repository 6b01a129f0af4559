//! # Hashing Utilities
//!
//! Cryptographic hash functions used throughout Vesper. One hash function,
//! used everywhere, and we refuse to support more without a very good reason:
//!
//! - **SHA-256** -- for peer fingerprints, transaction IDs (via the classic
//!   `double_sha256` construction), and interoperability with the rest of
//!   the "we chose SHA-256 in 2009 and now we're stuck with it" ecosystem.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns a 32-byte digest as a `Vec<u8>`.
///
/// Why `Vec<u8>` and not `[u8; 32]`? Because half the callers immediately
/// pass it to functions that want `&[u8]`, and the other half want to
/// chain it into `double_sha256`. The heap allocation is noise compared
/// to the cost of the hash itself.
///
/// # Example
///
/// ```
/// use vesper_protocol::crypto::sha256;
///
/// let hash = sha256(b"vesper node");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute the SHA-256 hash and return a fixed-size array.
///
/// Same as `sha256()` but returns `[u8; 32]` for callers that want
/// a fixed-size type without the heap allocation. Use this in hot paths
/// where the array type propagates naturally (fingerprints, txids).
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// This construction is used for transaction IDs in Bitcoin and many other
/// protocols, Vesper included. The double-hash provides protection against
/// length extension attacks (which SHA-256 alone is vulnerable to, though
/// in practice this matters less than people think).
///
/// # Example
///
/// ```
/// use vesper_protocol::crypto::double_sha256;
///
/// let tx_id = double_sha256(b"raw transaction bytes");
/// assert_eq!(tx_id.len(), 32);
/// ```
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Double-SHA-256 returning a fixed-size array.
///
/// The transaction-ID path wants `[u8; 32]`; everything else can take the
/// `Vec<u8>` variant.
pub fn double_sha256_array(data: &[u8]) -> [u8; 32] {
    sha256_array(&sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of empty string -- the canonical test vector everyone should
        // have memorized by now.
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn sha256_deterministic() {
        let a = sha256(b"vesper");
        let b = sha256(b"vesper");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_sha256_array_matches_vec() {
        let vec_result = sha256(b"test data");
        let arr_result = sha256_array(b"test data");
        assert_eq!(vec_result.as_slice(), arr_result.as_slice());
    }

    #[test]
    fn test_sha256_different_inputs() {
        let a = sha256(b"vesper");
        let b = sha256(b"Vesper"); // case sensitive!
        assert_ne!(a, b);
    }

    #[test]
    fn double_sha256_differs_from_single() {
        let single = sha256(b"vesper");
        let double = double_sha256(b"vesper");
        assert_ne!(single, double);
        assert_eq!(double.len(), 32);

        // But double should equal SHA-256 of the single hash
        let manual_double = sha256(&single);
        assert_eq!(double, manual_double);
    }

    #[test]
    fn test_double_sha256_array_matches_vec() {
        let vec_result = double_sha256(b"raw tx");
        let arr_result = double_sha256_array(b"raw tx");
        assert_eq!(vec_result.as_slice(), arr_result.as_slice());
    }
}
