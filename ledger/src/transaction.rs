use serde::{Deserialize, Serialize};
use shared::{sha256_hex, sign_transaction, verify_transaction, BlockchainError, Result};
use uuid::Uuid;

/// A signed transfer of value between two addresses.
///
/// An empty `from_address` marks a *coinbase* transaction: the system-issued
/// payout a miner receives for a block, which carries no signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "fromAddress")]
    pub from_address: String,
    #[serde(rename = "toAddress")]
    pub to_address: String,
    pub amount: f64,
    pub timestamp: i64,
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    pub signature: String,
}

impl Transaction {
    /// Creates a new, unsigned transaction with a fresh id and the current
    /// timestamp.
    #[must_use]
    pub fn new(from_address: impl Into<String>, to_address: impl Into<String>, amount: f64) -> Self {
        Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount,
            timestamp: chrono::Utc::now().timestamp(),
            transaction_id: Uuid::new_v4().to_string(),
            signature: String::new(),
        }
    }

    /// Creates the coinbase transaction that pays a mining reward.
    #[must_use]
    pub fn coinbase(to_address: impl Into<String>, amount: f64) -> Self {
        Self::new(String::new(), to_address, amount)
    }

    /// Returns the canonical data string used for both hashing and signing:
    /// `from_address ∥ to_address ∥ amount_2dp ∥ timestamp ∥ transaction_id`.
    #[must_use]
    pub fn data_string(&self) -> String {
        format!(
            "{}{}{:.2}{}{}",
            self.from_address, self.to_address, self.amount, self.timestamp, self.transaction_id
        )
    }

    /// Computes the SHA-256 hash of the canonical data string.
    #[must_use]
    pub fn hash(&self) -> String {
        sha256_hex(self.data_string().as_bytes())
    }

    /// Returns whether this is a coinbase (system-issued) transaction.
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.from_address.is_empty()
    }

    /// Signs the transaction's data string with `private_pem`, setting
    /// `signature` to the base64 DER `(R, S)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::CryptographicError`] if `private_pem` is
    /// malformed.
    pub fn sign(&mut self, private_pem: &str) -> Result<()> {
        self.signature = sign_transaction(&self.data_string(), private_pem)?;
        Ok(())
    }

    /// Verifies the transaction's signature against `from_address`.
    ///
    /// A coinbase transaction (empty `from_address`) is implicitly valid; a
    /// non-coinbase transaction with an empty signature is never valid.
    #[must_use]
    pub fn verify(&self) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.signature.is_empty() {
            return false;
        }
        verify_transaction(&self.data_string(), &self.from_address, &self.signature)
    }

    /// Basic structural and signature validation.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidTransaction`] on a negative amount,
    /// a missing signature on a non-coinbase transaction, or a signature that
    /// fails to verify.
    pub fn validate_basic(&self) -> Result<()> {
        if self.amount < 0.0 {
            return Err(BlockchainError::InvalidTransaction(
                "amount must not be negative".to_string(),
            ));
        }
        if !self.verify() {
            return Err(BlockchainError::InvalidTransaction(
                "signature verification failed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::new_wallet;

    #[test]
    fn coinbase_is_implicitly_valid() {
        let tx = Transaction::coinbase("miner-pub-pem", 5.0);
        assert!(tx.is_coinbase());
        assert!(tx.verify());
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn signed_transaction_verifies() {
        let (priv_pem, pub_pem) = new_wallet().unwrap();
        let mut tx = Transaction::new(pub_pem, "bob", 10.0);
        tx.sign(&priv_pem).unwrap();
        assert!(tx.verify());
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn unsigned_non_coinbase_fails_validation() {
        let tx = Transaction::new("alice-pub-pem", "bob", 10.0);
        assert!(!tx.verify());
        assert!(tx.validate_basic().is_err());
    }

    #[test]
    fn mutating_any_signed_field_invalidates_signature() {
        let (priv_pem, pub_pem) = new_wallet().unwrap();
        let mut tx = Transaction::new(pub_pem, "bob", 10.0);
        tx.sign(&priv_pem).unwrap();
        assert!(tx.verify());

        let mut tampered = tx.clone();
        tampered.amount = 99.0;
        assert!(!tampered.verify());

        let mut tampered = tx.clone();
        tampered.to_address = "mallory".to_string();
        assert!(!tampered.verify());

        let mut tampered = tx.clone();
        tampered.timestamp += 1;
        assert!(!tampered.verify());

        let mut tampered = tx;
        tampered.transaction_id = "other-id".to_string();
        assert!(!tampered.verify());
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::coinbase("miner", 5.0);
        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn negative_amount_rejected() {
        let tx = Transaction::coinbase("miner", -1.0);
        assert!(tx.validate_basic().is_err());
    }
}
