pub mod crypto;
pub mod error;
pub mod hash;

pub use crypto::{new_wallet, sign_transaction, verify_transaction};
pub use error::BlockchainError;
pub use hash::{leading_zero_hex_chars, meets_difficulty, sha256_bytes, sha256_hex};

pub type Result<T> = std::result::Result<T, BlockchainError>;
