use clap::Parser;

/// Node configuration: the four parameters the CLI collaborator supplies,
/// plus the three mining constants the source hardcodes at `InitBlockchain`
/// call sites.
#[derive(Parser, Debug, Clone)]
#[command(name = "minichain")]
#[command(about = "A minimal proof-of-work blockchain node")]
pub struct NodeConfig {
    /// TCP address this node listens for peer connections on.
    #[arg(long, default_value = "localhost:8080")]
    pub listen_address: String,

    /// Control-surface address. Accepted and stored for forward
    /// compatibility with a future HTTP layer; unused by this binary.
    #[arg(long, default_value = "localhost:8090")]
    pub http_address: String,

    /// Comma-separated peer addresses to dial on startup.
    #[arg(long, default_value = "")]
    pub peers: String,

    /// Directory backing the embedded key-value store.
    #[arg(long, default_value = "chain_storage")]
    pub data_dir: String,

    /// Required count of leading hex-zero characters for a valid block hash.
    #[arg(long, default_value_t = 5)]
    pub difficulty: u32,

    /// Maximum transactions (including the coinbase) per block.
    #[arg(long, default_value_t = 5)]
    pub max_block_size: usize,

    /// Reward paid to the miner of each block.
    #[arg(long, default_value_t = 5.0)]
    pub mining_reward: f64,
}

impl NodeConfig {
    /// Splits `peers` on commas, trims whitespace, and drops empty entries.
    #[must_use]
    pub fn peer_list(&self) -> Vec<String> {
        self.peers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
