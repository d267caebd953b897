use crate::block::Block;
use crate::transaction::Transaction;
use shared::{meets_difficulty, BlockchainError, Result};

/// Persistence hook the ledger calls into on every state change. The root
/// crate's storage component implements this against its embedded store; the
/// ledger itself holds no opinion on what backs it.
pub trait BlockStore {
    /// Persists a newly appended block, allocating its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the write fails.
    fn append_block(&mut self, block: &Block) -> Result<()>;

    /// Persists a transaction newly admitted to the pending pool.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if the write fails.
    fn append_transaction(&mut self, tx: &Transaction) -> Result<()>;
}

/// A no-op store used where persistence is not wired in yet (tests, and any
/// caller that manages durability itself).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl BlockStore for NullStore {
    fn append_block(&mut self, _block: &Block) -> Result<()> {
        Ok(())
    }

    fn append_transaction(&mut self, _tx: &Transaction) -> Result<()> {
        Ok(())
    }
}

/// The hash-chained ledger: confirmed blocks, the pending transaction pool,
/// and the network parameters that govern mining.
pub struct Blockchain<S: BlockStore> {
    pub blocks: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub difficulty: u32,
    pub max_block_size: usize,
    pub mining_reward: f64,
    store: S,
}

impl<S: BlockStore> Blockchain<S> {
    /// Builds a chain from blocks and pending transactions already recovered
    /// from storage (or empty, for a fresh chain that the caller will seed
    /// with a mined genesis block).
    #[must_use]
    pub fn new(
        blocks: Vec<Block>,
        pending_transactions: Vec<Transaction>,
        difficulty: u32,
        max_block_size: usize,
        mining_reward: f64,
        store: S,
    ) -> Self {
        Self {
            blocks,
            pending_transactions,
            difficulty,
            max_block_size,
            mining_reward,
            store,
        }
    }

    /// The most recently appended block, if any.
    #[must_use]
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// The backing store, for callers that need to reach persistence
    /// operations (flushing, closing) outside the append path.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates `tx`, appends it to the pending pool, and asks the store to
    /// persist it.
    ///
    /// The pool append happens before the persistence call; on
    /// `StorageFailure` the transaction remains in the in-memory pool.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InvalidTransaction`] if `tx` fails basic
    /// validation, or [`BlockchainError::StorageFailure`] if persistence
    /// fails.
    pub fn add_transaction_to_pool(&mut self, tx: Transaction) -> Result<()> {
        tx.validate_basic()?;
        self.pending_transactions.push(tx.clone());
        self.store.append_transaction(&tx)
    }

    /// Appends `block` to the chain, overwriting its `previous_hash` with the
    /// current tip's hash first. This applies uniformly to locally-mined
    /// blocks (where it is a no-op, since the candidate was built against the
    /// tip already) and to gossip-ingested blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::StorageFailure`] if persistence fails; the
    /// block is not appended to the in-memory chain in that case.
    pub fn add_block(&mut self, mut block: Block) -> Result<()> {
        if let Some(tip) = self.tip() {
            block.previous_hash = tip.hash.clone();
        }
        self.store.append_block(&block)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Sums credits to `address` minus debits from `address` across every
    /// confirmed block. The pending pool is not included.
    #[must_use]
    pub fn get_balance(&self, address: &str) -> f64 {
        let mut balance = 0.0;
        for block in &self.blocks {
            for tx in &block.transactions {
                if tx.to_address == address {
                    balance += tx.amount;
                }
                if tx.from_address == address {
                    balance -= tx.amount;
                }
            }
        }
        balance
    }

    /// Mines a candidate block from the pending pool, paying `miner_address`
    /// the mining reward, and appends it to the chain on success.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::EmptyPool`] if the pending pool is empty,
    /// [`BlockchainError::InvalidDifficulty`] if `self.difficulty == 0`, or
    /// [`BlockchainError::StorageFailure`] if persisting the mined block
    /// fails (the drained pending transactions are lost from the pool in
    /// that case — they are not restored).
    pub fn mine_pending_transactions(&mut self, miner_address: &str) -> Result<Block> {
        if self.difficulty == 0 {
            return Err(BlockchainError::InvalidDifficulty);
        }
        if self.pending_transactions.is_empty() {
            return Err(BlockchainError::EmptyPool);
        }

        let drain_count = if self.pending_transactions.len() < self.max_block_size {
            self.pending_transactions.len()
        } else {
            self.max_block_size - 1
        };
        let mut transactions: Vec<Transaction> =
            self.pending_transactions.drain(..drain_count).collect();

        let coinbase = Transaction::coinbase(miner_address, self.mining_reward);
        transactions.push(coinbase);

        let previous_hash = self.tip().map(|b| b.hash.clone()).unwrap_or_default();
        let mut block = Block::new(
            transactions,
            chrono::Utc::now().timestamp(),
            previous_hash,
            self.max_block_size,
        );
        block.mine(self.difficulty);

        self.store.append_block(&block)?;
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Walks the chain verifying I1 (linkage), I2 (hash integrity), I3
    /// (proof-of-work, genesis exempted), I4 (capacity), and I5 (signatures).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        for (i, block) in self.blocks.iter().enumerate() {
            if block.hash != block.calculate_hash() {
                return false;
            }
            if i > 0 {
                let previous = &self.blocks[i - 1];
                if block.previous_hash != previous.hash {
                    return false;
                }
                if !meets_difficulty(&block.hash, self.difficulty) {
                    return false;
                }
            }
            if block.validate_basic().is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> Block {
        Block::new(vec![], 1_700_000_000, String::new(), 10)
    }

    fn chain_with_genesis(difficulty: u32) -> Blockchain<NullStore> {
        Blockchain::new(vec![genesis()], vec![], difficulty, 5, 1.0, NullStore)
    }

    #[test]
    fn fresh_chain_is_valid() {
        let chain = chain_with_genesis(2);
        assert!(chain.is_valid());
    }

    #[test]
    fn mining_with_empty_pool_fails() {
        let mut chain = chain_with_genesis(2);
        assert!(matches!(
            chain.mine_pending_transactions("miner"),
            Err(BlockchainError::EmptyPool)
        ));
    }

    #[test]
    fn zero_difficulty_is_rejected() {
        let mut chain = chain_with_genesis(0);
        chain
            .add_transaction_to_pool(Transaction::new("alice-pub-pem", "bob", 1.0))
            .unwrap_or(());
        assert!(matches!(
            chain.mine_pending_transactions("miner"),
            Err(BlockchainError::InvalidDifficulty)
        ));
    }

    #[test]
    fn mining_drains_pool_and_pays_reward() {
        let mut chain = chain_with_genesis(1);
        let tx = Transaction::coinbase("alice", 0.0);
        chain.pending_transactions.push(tx);

        let block = chain.mine_pending_transactions("miner").unwrap();
        assert!(chain.pending_transactions.is_empty());
        assert!(block.has_trailing_coinbase());
        assert_eq!(chain.get_balance("miner"), 1.0);
        assert!(chain.is_valid());
    }

    #[test]
    fn pool_drain_reserves_one_slot_for_coinbase_when_full() {
        let mut chain = chain_with_genesis(1);
        chain.max_block_size = 3;
        for i in 0..5 {
            chain
                .pending_transactions
                .push(Transaction::coinbase(format!("payee-{i}"), 1.0));
        }

        let block = chain.mine_pending_transactions("miner").unwrap();
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(chain.pending_transactions.len(), 2);
    }

    #[test]
    fn get_balance_nets_credits_and_debits() {
        let mut chain = chain_with_genesis(1);
        chain.pending_transactions.push(Transaction::new("alice", "bob", 10.0));
        chain.mine_pending_transactions("miner").unwrap();
        assert_eq!(chain.get_balance("alice"), -10.0);
        assert_eq!(chain.get_balance("bob"), 10.0);
    }

    #[test]
    fn tampered_block_fails_validation() {
        let mut chain = chain_with_genesis(1);
        chain.pending_transactions.push(Transaction::coinbase("alice", 1.0));
        chain.mine_pending_transactions("miner").unwrap();

        chain.blocks[1].nonce += 1;
        assert!(!chain.is_valid());
    }

    #[test]
    fn add_block_overwrites_previous_hash_with_tip() {
        let mut chain = chain_with_genesis(1);
        let stray = Block::new(vec![], 1_700_000_001, "not-the-tip".to_string(), 5);
        chain.add_block(stray).unwrap();
        assert_eq!(chain.blocks[1].previous_hash, chain.blocks[0].hash);
    }
}
