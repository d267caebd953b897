use thiserror::Error;

/// Crate-wide error type shared by the ledger, persistence, gossip, and
/// mining-coordinator layers so every component converts into the same type
/// with `?` instead of layering a component-local error on top.
#[derive(Error, Debug)]
pub enum BlockchainError {
    /// Signature verification failed, or a non-coinbase transaction carried
    /// no signature.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A block failed structural validation: capacity, coinbase placement,
    /// proof-of-work, or chain linkage.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Mining was invoked with no pending transactions.
    #[error("pending pool is empty")]
    EmptyPool,

    /// Mining was invoked with a non-positive difficulty.
    #[error("difficulty must be a positive integer")]
    InvalidDifficulty,

    /// The miner exclusion flag was already held.
    #[error("a mining job is already in progress")]
    Busy,

    /// An unknown job id or peer address was requested.
    #[error("not found")]
    NotFound,

    /// The underlying key-value store failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A peer sent a malformed or unrecognized message; the connection is
    /// kept open.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A socket read or write failed; the connection is torn down.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A cryptographic operation (key parsing, signing) failed.
    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportError(err.to_string())
    }
}
