//! ECDSA P-256 key handling, transaction signing and verification.
//!
//! Signing operates on the raw 32-byte digest produced by double SHA-256
//! rather than letting the ECDSA implementation hash the message itself —
//! the source this system descends from hashes the data string once to get a
//! hex digest, decodes that digest back to bytes, then hashes again and signs
//! the result directly. Preserved here via `sign_prehash`/`verify_prehash` so
//! signatures stay byte-for-byte compatible.

use crate::hash::sha256_bytes;
use crate::{BlockchainError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::SecretKey;
use pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use sec1::{DecodeEcPrivateKey, EncodeEcPrivateKey};
use zeroize::Zeroizing;

/// Generates a fresh P-256 keypair and returns `(private_pem, public_pem)`.
///
/// The private key is encoded as a SEC1 `"EC PRIVATE KEY"` PEM; the public
/// key as a `SubjectPublicKeyInfo` `"PUBLIC KEY"` PEM.
///
/// # Errors
///
/// Returns [`BlockchainError::CryptographicError`] if PEM encoding fails.
pub fn new_wallet() -> Result<(String, String)> {
    let secret_key = SecretKey::random(&mut rand_core::OsRng);
    let private_pem = secret_key
        .to_sec1_pem(LineEnding::LF)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let public_pem = secret_key
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    Ok((private_pem.to_string(), public_pem))
}

/// The two-round digest this system signs and verifies: `SHA-256(SHA-256(data))`.
fn double_hash(data_string: &str) -> [u8; 32] {
    let first = sha256_bytes(data_string.as_bytes());
    sha256_bytes(&first)
}

/// Signs `data_string` with the PEM-encoded private key and returns the
/// base64 of the ASN.1 DER `(R, S)` signature.
///
/// # Errors
///
/// Returns [`BlockchainError::CryptographicError`] if `private_pem` is not a
/// well-formed SEC1 P-256 private key.
pub fn sign_transaction(data_string: &str, private_pem: &str) -> Result<String> {
    let secret_key = SecretKey::from_sec1_pem(private_pem)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let signing_key = SigningKey::from(secret_key);
    let digest = Zeroizing::new(double_hash(data_string));
    let signature: Signature = signing_key
        .sign_prehash(digest.as_ref())
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    Ok(BASE64.encode(signature.to_der().as_bytes()))
}

/// Verifies a transaction's signature against its `from_address` public key.
///
/// Per the signing contract, an empty `from_address` marks a coinbase
/// transaction and is implicitly valid; an empty signature is never valid.
/// Malformed PEM, curve mismatch, or malformed DER are reported as `false`
/// rather than propagated — verification failure and malformed input are
/// indistinguishable to callers.
#[must_use]
pub fn verify_transaction(data_string: &str, from_address_pem: &str, signature_b64: &str) -> bool {
    if from_address_pem.is_empty() {
        return true;
    }
    if signature_b64.is_empty() {
        return false;
    }
    let Ok(public_key) = p256::PublicKey::from_public_key_pem(from_address_pem) else {
        return false;
    };
    let verifying_key = VerifyingKey::from(public_key);
    let Ok(der_bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&der_bytes) else {
        return false;
    };
    let digest = double_hash(data_string);
    verifying_key.verify_prehash(&digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let (priv_pem, pub_pem) = new_wallet().unwrap();
        let data = "aliceSALICEbobSBOB10.001700000000abc123";
        let sig = sign_transaction(data, &priv_pem).unwrap();
        assert!(verify_transaction(data, &pub_pem, &sig));
    }

    #[test]
    fn tampered_data_fails_verification() {
        let (priv_pem, pub_pem) = new_wallet().unwrap();
        let data = "alice|bob|10.00|1700000000|abc123";
        let sig = sign_transaction(data, &priv_pem).unwrap();
        assert!(!verify_transaction("alice|bob|99.00|1700000000|abc123", &pub_pem, &sig));
    }

    #[test]
    fn empty_from_address_is_implicitly_valid() {
        assert!(verify_transaction("anything", "", ""));
    }

    #[test]
    fn empty_signature_is_never_valid() {
        let (_priv_pem, pub_pem) = new_wallet().unwrap();
        assert!(!verify_transaction("anything", &pub_pem, ""));
    }

    #[test]
    fn malformed_public_key_fails_closed() {
        assert!(!verify_transaction("anything", "not a pem", "c2ln"));
    }
}
