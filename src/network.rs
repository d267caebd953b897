//! Raw TCP gossip transport and protocol.
//!
//! All peer traffic is newline-terminated UTF-8 text. The connection
//! handshake mixes plain lines with a single little-endian 32-bit length
//! frame; this is ad hoc but preserved for interoperability rather than
//! silently replaced with a cleaner framing.

use crate::node::SharedChain;
use ledger::{Block, Transaction};
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

/// Message envelope exchanged after the handshake completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "transaction")]
    Transaction { transaction: Transaction },
    #[serde(rename = "block")]
    Block { block: Block },
}

/// Live outbound write-half of a peer connection, registered so broadcasts
/// can reach it.
type PeerConnections = Arc<Mutex<HashMap<String, tokio::net::tcp::OwnedWriteHalf>>>;
/// Whether each known peer address is currently connected.
type PeerActivity = Arc<Mutex<HashMap<String, bool>>>;

/// The gossip overlay: registered connections, known-peer activity, and this
/// node's own address (sent during handshakes).
#[derive(Clone)]
pub struct Network {
    own_address: String,
    connections: PeerConnections,
    activity: PeerActivity,
    shutdown: Arc<Notify>,
}

impl Network {
    #[must_use]
    pub fn new(own_address: String) -> Self {
        Self {
            own_address,
            connections: Arc::new(Mutex::new(HashMap::new())),
            activity: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Binds the listener and accepts inbound connections until
    /// [`Network::shutdown`] is called. Each accepted connection is handled
    /// on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::TransportError`] if the listener cannot
    /// bind.
    pub async fn serve(&self, chain: SharedChain) -> Result<()> {
        let listener = TcpListener::bind(&self.own_address)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        info!(address = %self.own_address, "listening for peers");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let network = self.clone();
                    let chain = chain.clone();
                    tokio::spawn(async move {
                        if let Err(e) = network.handle_inbound(stream, chain).await {
                            warn!(peer = %addr, error = %e, "inbound connection ended with error");
                        }
                    });
                }
                () = self.shutdown.notified() => {
                    info!(address = %self.own_address, "listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Signals [`Network::serve`] and every peer's length-probe loop to
    /// exit, closes every registered connection's write half, and clears the
    /// connection and activity registries.
    pub async fn shutdown(&self) {
        self.shutdown.notify_waiters();

        let mut connections = self.connections.lock().await;
        for (peer_address, conn) in connections.iter_mut() {
            if let Err(e) = conn.shutdown().await {
                warn!(%peer_address, error = %e, "error closing connection during shutdown");
            }
        }
        connections.clear();
        self.activity.lock().await.clear();
    }

    #[instrument(skip(self, stream, chain), fields(peer = %addr))]
    async fn handle_inbound_at(&self, stream: TcpStream, addr: std::net::SocketAddr, chain: SharedChain) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut hello = String::new();
        reader
            .read_line(&mut hello)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;

        let mut peer_address = String::new();
        reader
            .read_line(&mut peer_address)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        let peer_address = peer_address.trim().to_string();
        debug!(%peer_address, "peer identified itself");

        let mut length_buf = [0u8; 4];
        reader
            .read_exact(&mut length_buf)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        let mut newline = [0u8; 1];
        reader
            .read_exact(&mut newline)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        let peer_chain_length = u32::from_le_bytes(length_buf);
        debug!(peer_chain_length, "recorded peer's advertised chain length");

        let self_message = format!("PEER:{}\n", self.own_address);
        write_half
            .write_all(self_message.as_bytes())
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;

        self.register(peer_address.clone(), write_half).await;
        self.message_loop(reader, &peer_address, chain).await;
        self.remove(&peer_address).await;
        Ok(())
    }

    async fn handle_inbound(&self, stream: TcpStream, chain: SharedChain) -> Result<()> {
        let addr = stream
            .peer_addr()
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        self.handle_inbound_at(stream, addr, chain).await
    }

    /// Dials `peer_address`, performs the outbound handshake, registers the
    /// connection, and spawns a reader task plus a periodic length-probe
    /// task.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::TransportError`] if the connection cannot
    /// be established or the handshake write fails.
    #[instrument(skip(self, chain), fields(peer = %peer_address))]
    pub async fn dial(&self, peer_address: String, chain: SharedChain) -> Result<()> {
        let stream = TcpStream::connect(&peer_address)
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(b"Hello, Blockchain!\n")
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        write_half
            .write_all(format!("{}\n", self.own_address).as_bytes())
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;

        let chain_length = {
            let guard = chain.read().await;
            u32::try_from(guard.blocks.len()).unwrap_or(u32::MAX)
        };
        write_half
            .write_all(&chain_length.to_le_bytes())
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;
        write_half
            .write_all(b"\n")
            .await
            .map_err(|e| BlockchainError::TransportError(e.to_string()))?;

        info!("connected to peer");
        self.register(peer_address.clone(), write_half).await;

        let network = self.clone();
        let reader_chain = chain.clone();
        let reader = BufReader::new(read_half);
        let addr_for_reader = peer_address.clone();
        tokio::spawn(async move {
            network.message_loop(reader, &addr_for_reader, reader_chain).await;
            network.remove(&addr_for_reader).await;
        });

        let network = self.clone();
        let addr_for_probe = peer_address;
        let probe_chain = chain;
        tokio::spawn(async move {
            network.length_probe_loop(addr_for_probe, probe_chain).await;
        });

        Ok(())
    }

    async fn length_probe_loop(&self, peer_address: String, chain: SharedChain) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = self.shutdown.notified() => {
                    return;
                }
            }

            let chain_length = {
                let guard = chain.read().await;
                u32::try_from(guard.blocks.len()).unwrap_or(u32::MAX)
            };
            let mut connections = self.connections.lock().await;
            let Some(conn) = connections.get_mut(&peer_address) else {
                return;
            };
            let mut payload = chain_length.to_le_bytes().to_vec();
            payload.push(b'\n');
            if conn.write_all(&payload).await.is_err() {
                drop(connections);
                self.remove(&peer_address).await;
                return;
            }
        }
    }

    async fn message_loop<R>(&self, mut reader: BufReader<R>, peer_address: &str, chain: SharedChain)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!(%peer_address, "connection closed by peer");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%peer_address, error = %e, "read failed, closing connection");
                    return;
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Envelope>(trimmed) {
                Ok(Envelope::Transaction { transaction }) => {
                    let mut guard = chain.write().await;
                    match guard.add_transaction_to_pool(transaction) {
                        Ok(()) => debug!(%peer_address, "accepted transaction from peer"),
                        Err(e) => warn!(%peer_address, error = %e, "rejected transaction from peer"),
                    }
                }
                Ok(Envelope::Block { block }) => {
                    let mut guard = chain.write().await;
                    match guard.add_block(block) {
                        Ok(()) => debug!(%peer_address, "accepted block from peer"),
                        Err(e) => warn!(%peer_address, error = %e, "failed to persist block from peer"),
                    }
                }
                Err(e) => {
                    warn!(%peer_address, error = %e, "malformed or unknown message, skipping");
                }
            }
        }
    }

    async fn register(&self, peer_address: String, write_half: tokio::net::tcp::OwnedWriteHalf) {
        self.connections
            .lock()
            .await
            .insert(peer_address.clone(), write_half);
        self.activity.lock().await.insert(peer_address, true);
    }

    async fn remove(&self, peer_address: &str) {
        self.connections.lock().await.remove(peer_address);
        if let Some(flag) = self.activity.lock().await.get_mut(peer_address) {
            *flag = false;
        }
    }

    /// Serializes `tx` as a transaction envelope and writes it to every
    /// registered connection. A write failure against one peer removes that
    /// peer and continues broadcasting to the rest.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::SerializationError`] if `tx` cannot be
    /// serialized.
    pub async fn broadcast_transaction(&self, tx: &Transaction) -> Result<()> {
        let payload = serde_json::to_string(&Envelope::Transaction {
            transaction: tx.clone(),
        })?;
        self.broadcast(&payload).await;
        Ok(())
    }

    /// Symmetric with [`Network::broadcast_transaction`] for blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::SerializationError`] if `block` cannot be
    /// serialized.
    pub async fn broadcast_block(&self, block: &Block) -> Result<()> {
        let payload = serde_json::to_string(&Envelope::Block {
            block: block.clone(),
        })?;
        self.broadcast(&payload).await;
        Ok(())
    }

    async fn broadcast(&self, payload: &str) {
        let mut line = payload.to_string();
        line.push('\n');

        let mut dead = Vec::new();
        {
            let mut connections = self.connections.lock().await;
            for (peer_address, conn) in connections.iter_mut() {
                if conn.write_all(line.as_bytes()).await.is_err() {
                    dead.push(peer_address.clone());
                }
            }
        }
        for peer_address in dead {
            self.remove(&peer_address).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{Blockchain, NullStore};
    use tokio::sync::RwLock;

    fn empty_chain() -> SharedChain {
        let genesis = Block::new(vec![], 1_700_000_000, String::new(), 5);
        Arc::new(RwLock::new(Blockchain::new(vec![genesis], vec![], 1, 5, 1.0, NullStore)))
    }

    #[test]
    fn envelope_transaction_round_trips_wire_shape() {
        let tx = Transaction::coinbase("alice", 1.0);
        let envelope = Envelope::Transaction { transaction: tx.clone() };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "transaction");
        assert!(json["transaction"].is_object());

        let decoded: Envelope = serde_json::from_value(json).unwrap();
        match decoded {
            Envelope::Transaction { transaction } => assert_eq!(transaction, tx),
            Envelope::Block { .. } => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn two_nodes_gossip_a_transaction_over_loopback() {
        let listener_chain = empty_chain();
        let dialer_chain = empty_chain();

        let listener_network = Network::new("127.0.0.1:0".to_string());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_chain = listener_chain.clone();
        let accept_network = listener_network.clone();
        tokio::spawn(async move {
            if let Ok((stream, peer_addr)) = listener.accept().await {
                let _ = accept_network.handle_inbound_at(stream, peer_addr, accept_chain).await;
            }
        });

        let dialer_network = Network::new(format!("127.0.0.1:{}", addr.port() + 1));
        dialer_network.dial(addr.to_string(), dialer_chain.clone()).await.unwrap();

        let tx = Transaction::coinbase("alice", 2.0);
        dialer_network.broadcast_transaction(&tx).await.unwrap();

        for _ in 0..200 {
            if !listener_chain.read().await.pending_transactions.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let guard = listener_chain.read().await;
        assert_eq!(guard.pending_transactions.len(), 1);
        assert_eq!(guard.pending_transactions[0].to_address, "alice");
    }
}
