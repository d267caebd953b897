use clap::Parser;
use minichain::config::NodeConfig;
use minichain::node::Node;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> shared::Result<()> {
    let config = NodeConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        listen_address = %config.listen_address,
        http_address = %config.http_address,
        "http control surface address accepted for forward compatibility; no HTTP listener is started by this binary"
    );

    let node = Node::init(&config)?;
    info!(peers = ?config.peer_list(), "starting node");

    tokio::select! {
        result = node.run(config.peer_list()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            node.shutdown().await
        }
    }
}
