//! Single-miner-exclusion mining coordinator.
//!
//! Mining is CPU-bound and can run for seconds to minutes, so the control
//! surface hands back a job id immediately and polls status separately
//! rather than blocking the caller on the mining loop itself.

use crate::node::SharedChain;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of a mining job, as observed by [`MiningCoordinator::get_status`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Successful { block_hash: String },
    Failed { details: String },
}

/// Tracks the single-miner exclusion flag and the status of every job
/// started against this node.
pub struct MiningCoordinator {
    busy: Arc<AtomicBool>,
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
}

impl Default for MiningCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MiningCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attempts to acquire the exclusion flag and, on success, spawns a
    /// background mining task against `chain`. Returns the new job id, or
    /// `None` if a mining job is already in progress.
    pub async fn start_mining(&self, chain: SharedChain, miner_address: String) -> Option<Uuid> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let job_id = Uuid::new_v4();
        self.jobs.write().await.insert(job_id, JobStatus::Pending);
        info!(%job_id, %miner_address, "mining job started");

        let busy = Arc::clone(&self.busy);
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let mut guard = chain.blocking_write();
                guard.mine_pending_transactions(&miner_address)
            })
            .await;

            let status = match result {
                Ok(Ok(block)) => {
                    info!(%job_id, hash = %block.hash, "mining job succeeded");
                    JobStatus::Successful {
                        block_hash: block.hash,
                    }
                }
                Ok(Err(e)) => {
                    warn!(%job_id, error = %e, "mining job failed");
                    JobStatus::Failed {
                        details: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(%job_id, error = %e, "mining task panicked");
                    JobStatus::Failed {
                        details: "mining task panicked".to_string(),
                    }
                }
            };

            jobs.write().await.insert(job_id, status);
            busy.store(false, Ordering::SeqCst);
        });

        Some(job_id)
    }

    /// Looks up a job's current status, or `None` if the id is unknown.
    pub async fn get_status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.jobs.read().await.get(&job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{Blockchain, NullStore, Transaction};
    use std::sync::Arc as StdArc;
    use tokio::sync::RwLock as TokioRwLock;

    fn chain_with_pending_tx() -> SharedChain {
        let genesis = ledger::Block::new(vec![], 1_700_000_000, String::new(), 5);
        let mut chain = Blockchain::new(vec![genesis], vec![], 1, 5, 1.0, NullStore);
        chain.pending_transactions.push(Transaction::coinbase("alice", 1.0));
        StdArc::new(TokioRwLock::new(chain))
    }

    #[tokio::test]
    async fn start_mining_returns_a_job_id_and_eventually_succeeds() {
        let coordinator = MiningCoordinator::new();
        let chain = chain_with_pending_tx();

        let job_id = coordinator
            .start_mining(chain, "miner".to_string())
            .await
            .expect("exclusion flag should be free");

        for _ in 0..200 {
            if let Some(status) = coordinator.get_status(job_id).await {
                if status != JobStatus::Pending {
                    assert!(matches!(status, JobStatus::Successful { .. }));
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("mining job did not complete in time");
    }

    #[tokio::test]
    async fn second_concurrent_job_is_rejected_as_busy() {
        let coordinator = MiningCoordinator::new();
        let chain = chain_with_pending_tx();

        let first = coordinator.start_mining(chain.clone(), "miner".to_string()).await;
        assert!(first.is_some());

        let second = coordinator.start_mining(chain, "miner".to_string()).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn unknown_job_id_returns_none() {
        let coordinator = MiningCoordinator::new();
        assert!(coordinator.get_status(Uuid::new_v4()).await.is_none());
    }
}
