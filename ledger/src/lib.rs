pub mod block;
pub mod blockchain;
pub mod transaction;

pub use block::Block;
pub use blockchain::{BlockStore, Blockchain, NullStore};
pub use transaction::Transaction;

pub use shared::{BlockchainError, Result};
