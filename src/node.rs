//! Node lifecycle: load-or-init the chain, start the listener, dial
//! configured peers, and hand back the handles a thin `main.rs` needs.

use crate::config::NodeConfig;
use crate::mining_coordinator::MiningCoordinator;
use crate::network::Network;
use crate::storage::SledStore;
use ledger::Blockchain;
use shared::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// The chain behind a single reader/writer lock, shared between the network
/// loop, the mining coordinator, and any future control-surface handlers.
/// Writers (`add_transaction_to_pool`, `mine_pending_transactions`,
/// `add_block`) and readers (`get_balance`, `is_valid`) all take this one
/// lock rather than one per field.
pub type SharedChain = Arc<RwLock<Blockchain<SledStore>>>;

/// A running node: the shared chain, the gossip network, and the mining
/// coordinator.
pub struct Node {
    pub chain: SharedChain,
    pub network: Network,
    pub mining: MiningCoordinator,
}

impl Node {
    /// Loads the chain from `config.data_dir`, mining a genesis block if the
    /// store is empty, then constructs the network and mining coordinator.
    /// Does not yet bind the listener or dial peers — call [`Node::run`] for
    /// that.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or a stored value
    /// fails to deserialize.
    pub fn init(config: &NodeConfig) -> Result<Self> {
        let (store, blocks, pending) = SledStore::load(&config.data_dir)?;
        let needs_genesis = blocks.is_empty();

        let mut chain = Blockchain::new(
            blocks,
            pending,
            config.difficulty,
            config.max_block_size,
            config.mining_reward,
            store,
        );

        if needs_genesis {
            info!("store is empty, mining genesis block");
            let mut genesis = ledger::Block::new(
                vec![],
                chrono::Utc::now().timestamp(),
                String::new(),
                config.max_block_size,
            );
            genesis.mine(config.difficulty);
            chain.add_block(genesis)?;
        }

        Ok(Self {
            chain: Arc::new(RwLock::new(chain)),
            network: Network::new(config.listen_address.clone()),
            mining: MiningCoordinator::new(),
        })
    }

    /// Starts the listener and dials every peer in `peers` concurrently.
    /// Runs until [`Node::shutdown`] is called or the listener fails to
    /// bind.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind.
    pub async fn run(&self, peers: Vec<String>) -> Result<()> {
        for peer in peers {
            let network = self.network.clone();
            let chain = self.chain.clone();
            tokio::spawn(async move {
                if let Err(e) = network.dial(peer.clone(), chain).await {
                    tracing::warn!(%peer, error = %e, "failed to dial peer");
                }
            });
        }

        self.network.serve(self.chain.clone()).await
    }

    /// Stops accepting new peer connections, closes every registered
    /// connection, and flushes the backing store. Safe to call once the
    /// node's listener is already running; [`Network::serve`] and every
    /// length-probe loop return shortly after.
    ///
    /// # Errors
    ///
    /// Returns an error if the final store flush fails.
    pub async fn shutdown(&self) -> Result<()> {
        self.network.shutdown().await;
        self.chain.read().await.store().flush()?;
        info!("node shut down");
        Ok(())
    }
}
