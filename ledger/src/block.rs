use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::{meets_difficulty, sha256_hex, BlockchainError, Result};

/// A block of confirmed transactions, hash-chained to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub transactions: Vec<Transaction>,
    pub timestamp: i64,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
    pub capacity: usize,
}

impl Block {
    /// Builds a block with `nonce = 0` and an immediately-computed hash.
    /// This does not perform proof-of-work; use [`Block::mine`] for that.
    #[must_use]
    pub fn new(
        transactions: Vec<Transaction>,
        timestamp: i64,
        previous_hash: String,
        capacity: usize,
    ) -> Self {
        let mut block = Self {
            transactions,
            timestamp,
            previous_hash,
            nonce: 0,
            hash: String::new(),
            capacity,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The bytes hashed to produce `hash`: `timestamp ∥ previous_hash ∥
    /// (each transaction's data string, in order) ∥ nonce`.
    #[must_use]
    pub fn data_bytes(&self) -> Vec<u8> {
        let mut data = format!("{}{}", self.timestamp, self.previous_hash);
        for tx in &self.transactions {
            data.push_str(&tx.data_string());
        }
        data.push_str(&self.nonce.to_string());
        data.into_bytes()
    }

    /// Pure hash computation over the block's current fields. Does not
    /// iterate `nonce` — a block literal with `nonce = 0` and an
    /// unsatisfying hash is a legal value; only [`Block::mine`] enforces the
    /// proof-of-work predicate.
    #[must_use]
    pub fn calculate_hash(&self) -> String {
        sha256_hex(&self.data_bytes())
    }

    /// Increments `nonce` until `hash` has `difficulty` leading hex zeros,
    /// then stores the winning hash.
    pub fn mine(&mut self, difficulty: u32) {
        loop {
            self.hash = self.calculate_hash();
            if meets_difficulty(&self.hash, difficulty) {
                return;
            }
            self.nonce += 1;
        }
    }

    /// Whether `hash` currently satisfies `difficulty` leading hex zeros.
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Returns whether the last transaction (if any) is a coinbase.
    #[must_use]
    pub fn has_trailing_coinbase(&self) -> bool {
        self.transactions.last().is_some_and(Transaction::is_coinbase)
    }

    /// Structural validation of a confirmed block: capacity (I4), at most one
    /// coinbase and only as the final transaction (I6), and every
    /// non-coinbase transaction's signature verifies (I5).
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidBlock`] on the first violated
    /// invariant.
    pub fn validate_basic(&self) -> Result<()> {
        if self.transactions.len() > self.capacity {
            return Err(BlockchainError::InvalidBlock(format!(
                "block has {} transactions, capacity is {}",
                self.transactions.len(),
                self.capacity
            )));
        }

        let coinbase_count = self.transactions.iter().filter(|tx| tx.is_coinbase()).count();
        if coinbase_count > 1 {
            return Err(BlockchainError::InvalidBlock(
                "more than one coinbase transaction".to_string(),
            ));
        }
        if coinbase_count == 1 && !self.has_trailing_coinbase() {
            return Err(BlockchainError::InvalidBlock(
                "coinbase transaction must be last".to_string(),
            ));
        }

        for tx in &self.transactions {
            if tx.is_coinbase() {
                continue;
            }
            if !tx.verify() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "transaction {} failed signature verification",
                    tx.transaction_id
                )));
            }
        }

        Ok(())
    }
}
