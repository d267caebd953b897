//! Embedded persistence backed by `sled`.
//!
//! Keys are structured so that lexicographic iteration order matches
//! insertion order: `block_<seq06>_<hash>`, `tx_<seq06>_<tx_id>`, with a
//! single shared `block_sequence` counter allocating `<seq06>` for both
//! blocks and pending transactions.

use ledger::block::Block;
use ledger::blockchain::BlockStore;
use ledger::transaction::Transaction;
use shared::{BlockchainError, Result};
use std::path::Path;

const SEQUENCE_KEY: &[u8] = b"block_sequence";
const BLOCK_PREFIX: &str = "block_";
const TX_PREFIX: &str = "tx_";

/// A `sled`-backed store implementing the ledger's persistence contract.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Opens (creating if absent) the store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the store cannot be
    /// opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        Ok(Self { db })
    }

    fn next_sequence(&self) -> Result<u64> {
        let next = self
            .db
            .update_and_fetch(SEQUENCE_KEY, |old| {
                let current = old
                    .and_then(|bytes| std::str::from_utf8(bytes).ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                Some((current + 1).to_string().into_bytes())
            })
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?
            .ok_or_else(|| BlockchainError::StorageFailure("sequence counter missing".to_string()))?;
        std::str::from_utf8(&next)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BlockchainError::StorageFailure("corrupt sequence counter".to_string()))
    }

    /// Opens the store, reconstructs the confirmed chain and pending pool
    /// from its key space in lexicographic (= insertion) order, and returns
    /// them alongside the store itself. An empty store yields empty vectors;
    /// the caller is responsible for seeding a mined genesis block.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the store can't be
    /// opened, or [`BlockchainError::SerializationError`] if a stored value
    /// is not valid JSON for its expected type.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<Block>, Vec<Transaction>)> {
        let store = Self::open(path)?;
        let mut blocks = Vec::new();
        let mut pending = Vec::new();

        for entry in store.db.iter() {
            let (key, value) = entry.map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
            let key = String::from_utf8_lossy(&key);
            if key.starts_with(BLOCK_PREFIX) {
                blocks.push(serde_json::from_slice(&value)?);
            } else if key.starts_with(TX_PREFIX) {
                pending.push(serde_json::from_slice(&value)?);
            }
        }

        Ok((store, blocks, pending))
    }

    /// Rewrites the store to hold exactly `blocks` and `pending`, discarding
    /// whatever `block_*`/`tx_*` keys were there before. The delete and
    /// re-append are staged into a single [`sled::Batch`] and applied with
    /// one [`sled::Tree::apply_batch`] call, so a reader or a crash never
    /// observes a store with the old keys gone and the new ones only
    /// partially written.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the underlying batch
    /// fails to apply or flush, or [`BlockchainError::SerializationError`] if
    /// a block or transaction cannot be serialized.
    pub fn reset(&self, blocks: &[Block], pending: &[Transaction]) -> Result<()> {
        let stale: Vec<_> = self
            .db
            .iter()
            .keys()
            .filter_map(std::result::Result::ok)
            .filter(|k| {
                let k = String::from_utf8_lossy(k);
                k.starts_with(BLOCK_PREFIX) || k.starts_with(TX_PREFIX)
            })
            .collect();

        let mut batch = sled::Batch::default();
        for key in stale {
            batch.remove(key);
        }

        let mut seq: u64 = 0;
        for block in blocks {
            seq += 1;
            let key = format!("{BLOCK_PREFIX}{seq:06}_{}", block.hash);
            batch.insert(key.as_bytes(), serde_json::to_vec(block)?);
        }
        for tx in pending {
            seq += 1;
            let key = format!("{TX_PREFIX}{seq:06}_{}", tx.transaction_id);
            batch.insert(key.as_bytes(), serde_json::to_vec(tx)?);
        }
        batch.insert(SEQUENCE_KEY, seq.to_string().into_bytes());

        self.db
            .apply_batch(batch)
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    /// Flushes pending writes to disk. Called as part of node shutdown; the
    /// `sled::Db` itself closes its files when the last handle drops.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        Ok(())
    }
}

impl BlockStore for SledStore {
    fn append_block(&mut self, block: &Block) -> Result<()> {
        let seq = self.next_sequence()?;
        let key = format!("{BLOCK_PREFIX}{seq:06}_{}", block.hash);
        let value = serde_json::to_vec(block)?;
        self.db
            .insert(key, value)
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let seq = self.next_sequence()?;
        let key = format!("{TX_PREFIX}{seq:06}_{}", tx.transaction_id);
        let value = serde_json::to_vec(tx)?;
        self.db
            .insert(key, value)
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| BlockchainError::StorageFailure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_loads_empty() {
        let dir = tempfile_dir();
        let (_store, blocks, pending) = SledStore::load(&dir).unwrap();
        assert!(blocks.is_empty());
        assert!(pending.is_empty());
    }

    #[test]
    fn append_and_reload_preserves_order() {
        let dir = tempfile_dir();
        {
            let (mut store, _, _) = SledStore::load(&dir).unwrap();
            let genesis = Block::new(vec![], 1, String::new(), 5);
            let b1 = Block::new(vec![], 2, genesis.hash.clone(), 5);
            store.append_block(&genesis).unwrap();
            store.append_block(&b1).unwrap();
            store
                .append_transaction(&Transaction::coinbase("alice", 1.0))
                .unwrap();
        }

        let (_store, blocks, pending) = SledStore::load(&dir).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].timestamp, 1);
        assert_eq!(blocks[1].timestamp, 2);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn reset_rewrites_store_from_given_state() {
        let dir = tempfile_dir();
        let (store, _, _) = SledStore::load(&dir).unwrap();
        let genesis = Block::new(vec![], 1, String::new(), 5);
        store.reset(&[genesis.clone()], &[]).unwrap();

        let (_store, blocks, pending) = SledStore::load(&dir).unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(pending.is_empty());
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("minichain-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
