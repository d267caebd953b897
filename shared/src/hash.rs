//! SHA-256 hashing helpers shared by the ledger and persistence layers.
//!
//! Hashes in this system are carried around as lowercase hex strings rather
//! than a dedicated byte-array newtype: every wire and on-disk shape embeds
//! them as plain JSON strings (`hash`, `previousHash`), so a `String` avoids a
//! serialization layer that would otherwise just unwrap itself on every call.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data` and returns it as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the raw 32-byte SHA-256 digest of `data`.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Counts the number of leading ASCII `'0'` characters in a hex string.
#[must_use]
pub fn leading_zero_hex_chars(hash: &str) -> u32 {
    hash.chars().take_while(|&c| c == '0').count() as u32
}

/// Returns whether `hash` has at least `difficulty` leading hex zeros.
#[must_use]
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_hex_chars(hash) >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_64_lowercase_hex_chars() {
        let digest = sha256_hex(b"hello world");
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_input_matches_known_sha256() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn leading_zero_counting() {
        assert_eq!(leading_zero_hex_chars("000abc"), 3);
        assert_eq!(leading_zero_hex_chars("abc000"), 0);
        assert_eq!(leading_zero_hex_chars("000000"), 6);
    }

    #[test]
    fn difficulty_predicate() {
        assert!(meets_difficulty("0000ff", 4));
        assert!(!meets_difficulty("0000ff", 5));
    }
}
