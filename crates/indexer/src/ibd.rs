//! Initial Block Download: the five-phase checkpointed bulk import.
//!
//! Phases run in order (headers, checksums, bodies, witnesses, epochs),
//! each resumable from a single persisted checkpoint row.  Writes are
//! idempotent per height, so re-processing the `last_completed` boundary
//! item after a crash is harmless.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use tapnet_btcio::ReaderRpc;
use tapnet_config::IbdConfig;
use tapnet_db::types::{IbdCheckpoint, IbdPhase};
use tapnet_primitives::block::{compute_checksum_root, BlockRecord};
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::epoch::epoch_range;
use tapnet_primitives::params::Params;
use tapnet_primitives::witness::BlockWitness;
use tapnet_storage::NodeStorage;
use tapnet_tasks::ShutdownGuard;
use tracing::*;

use crate::epochs::EpochTracker;
use crate::errors::{IndexerError, IndexerResult};
use crate::task::build_ibd_tx_records;

/// Pulls historic witnesses from peers during the WITNESS_SYNC phase.
/// Absent by default; bulk imports normally skip witness collection.
#[async_trait]
pub trait WitnessFetcher: Send + Sync + 'static {
    async fn fetch_range(&self, start: u64, end: u64) -> Vec<BlockWitness>;
}

/// Outcome of a coordinator run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IbdOutcome {
    Completed,
    /// Cooperative abort; checkpoint reflects the last durable state.
    Cancelled,
}

pub struct IbdCoordinator<C> {
    client: Arc<C>,
    storage: Arc<NodeStorage>,
    params: Arc<Params>,
    config: IbdConfig,
    witness_fetcher: Option<Arc<dyn WitnessFetcher>>,
    shutdown: ShutdownGuard,
}

impl<C: ReaderRpc> IbdCoordinator<C> {
    pub fn new(
        client: Arc<C>,
        storage: Arc<NodeStorage>,
        params: Arc<Params>,
        config: IbdConfig,
        witness_fetcher: Option<Arc<dyn WitnessFetcher>>,
        shutdown: ShutdownGuard,
    ) -> Self {
        Self {
            client,
            storage,
            params,
            config,
            witness_fetcher,
            shutdown,
        }
    }

    /// The entry gate: enabled, not a regtest, far enough behind, and not
    /// already past the overlay activation height.
    pub fn should_run(&self, chain_tip: u64, committed: Option<u64>) -> bool {
        if !self.config.enabled {
            return false;
        }
        if self.params.overlay().network == bitcoin::Network::Regtest {
            return false;
        }
        if chain_tip.saturating_sub(committed.unwrap_or(0)) < self.config.threshold {
            return false;
        }
        if let Some(activation) = self.params.overlay().activation_height {
            if committed.is_some_and(|c| c >= activation) {
                return false;
            }
        }
        true
    }

    /// Import target: the chain tip, clamped to the activation height.
    pub fn target(&self, chain_tip: u64) -> u64 {
        match self.params.overlay().activation_height {
            Some(activation) => chain_tip.min(activation),
            None => chain_tip,
        }
    }

    pub async fn run(&self, chain_tip: u64) -> IndexerResult<IbdOutcome> {
        let start = match self.storage.block().get_chain_tip_async().await? {
            Some(tip) => tip + 1,
            None => 0,
        };
        let target = self.target(chain_tip);
        let mut checkpoint = self.resolve_checkpoint(start, target).await?;
        info!(
            phase = ?checkpoint.phase,
            resume = %checkpoint.last_completed,
            %target,
            "starting bulk import"
        );

        loop {
            let completed = match checkpoint.phase {
                IbdPhase::HeaderDownload => self.run_header_download(&mut checkpoint).await?,
                IbdPhase::ChecksumGeneration => {
                    self.run_checksum_generation(&mut checkpoint).await?
                }
                IbdPhase::TransactionDownload => {
                    self.run_transaction_download(&mut checkpoint).await?
                }
                IbdPhase::WitnessSync => self.run_witness_sync(&mut checkpoint).await?,
                IbdPhase::EpochFinalization => {
                    self.run_epoch_finalization(&mut checkpoint).await?
                }
                IbdPhase::Complete => {
                    info!(%target, "bulk import complete");
                    return Ok(IbdOutcome::Completed);
                }
            };

            if !completed {
                // Cancellation surfaced from inside a phase; the checkpoint
                // was not advanced past durable state.
                return Ok(IbdOutcome::Cancelled);
            }

            let next = checkpoint
                .phase
                .next()
                .expect("ibd: complete handled above");
            checkpoint = IbdCheckpoint {
                phase: next,
                last_completed: checkpoint.original_start,
                original_start: checkpoint.original_start,
                target: checkpoint.target,
            };
            self.storage
                .checkpoint()
                .put_checkpoint_async(checkpoint.clone())
                .await?;
        }
    }

    /// Loads and validates a stored checkpoint against actual storage, or
    /// builds a fresh one.
    async fn resolve_checkpoint(&self, start: u64, target: u64) -> IndexerResult<IbdCheckpoint> {
        let fresh = IbdCheckpoint {
            phase: IbdPhase::HeaderDownload,
            last_completed: start,
            original_start: start,
            target,
        };

        let Some(mut checkpoint) = self.storage.checkpoint().get_checkpoint_async().await? else {
            return Ok(fresh);
        };

        let stored_tip = self.storage.block().get_chain_tip_async().await?;
        let Some(stored_tip) = stored_tip else {
            debug!("checkpoint exists but storage is empty, starting fresh");
            return Ok(fresh);
        };
        if stored_tip < checkpoint.original_start {
            debug!(
                %stored_tip,
                original_start = %checkpoint.original_start,
                "stored state below checkpoint origin, discarding checkpoint"
            );
            self.storage.checkpoint().clear_checkpoint_async().await?;
            return Ok(fresh);
        }

        // Refresh the target; the chain kept moving while we were down.
        checkpoint.target = checkpoint.target.max(target);

        match checkpoint.phase {
            IbdPhase::HeaderDownload | IbdPhase::TransactionDownload => {
                checkpoint.last_completed = checkpoint.last_completed.min(stored_tip);
            }
            IbdPhase::ChecksumGeneration => {
                let boundary = self
                    .storage
                    .block()
                    .get_block_at_async(checkpoint.last_completed)
                    .await?;
                let has_checksum = boundary.map(|b| b.has_checksum()).unwrap_or(false);
                if !has_checksum {
                    warn!(
                        height = %checkpoint.last_completed,
                        "Checksum at {} missing, restarting phase",
                        checkpoint.last_completed
                    );
                    checkpoint.last_completed = checkpoint.original_start;
                }
            }
            IbdPhase::WitnessSync | IbdPhase::EpochFinalization | IbdPhase::Complete => {
                // Trust the recorded height for the cheap phases.
            }
        }
        Ok(checkpoint)
    }

    /// Parallel header fetch.  Returns false on cooperative cancellation.
    async fn run_header_download(&self, checkpoint: &mut IbdCheckpoint) -> IndexerResult<bool> {
        let mut next = checkpoint.last_completed;
        let mut since_checkpoint = 0u64;

        while next <= checkpoint.target {
            if self.shutdown.should_shutdown() {
                return Ok(false);
            }

            let batch_end = (next + self.config.header_batch_size - 1).min(checkpoint.target);
            let heights: Vec<u64> = (next..=batch_end).collect();

            for chunk in heights.chunks(self.config.worker_count.max(1)) {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|&height| {
                        let client = self.client.clone();
                        tokio::spawn(async move {
                            (height, client.get_block_header_at(height).await)
                        })
                    })
                    .collect();

                // Awaiting in order keeps writes height-ordered.
                for handle in handles {
                    let (height, res) = handle
                        .await
                        .map_err(|e| IndexerError::Other(format!("header fetch join: {e}")))?;
                    let header = res
                        .map_err(|e| IndexerError::Other(format!("header at {height}: {e}")))?;
                    let record = header_record(height, &header);
                    self.storage.block().put_header_async(record).await?;
                }
            }

            since_checkpoint += batch_end - next + 1;
            checkpoint.last_completed = batch_end;
            if since_checkpoint >= self.config.checkpoint_interval {
                since_checkpoint = 0;
                self.save(checkpoint).await?;
            }
            next = batch_end + 1;
        }

        self.save(checkpoint).await?;
        Ok(true)
    }

    /// Strictly sequential: each checksum chains on the previous one.
    async fn run_checksum_generation(&self, checkpoint: &mut IbdCheckpoint) -> IndexerResult<bool> {
        let mut since_checkpoint = 0u64;

        let mut prev_checksum = match checkpoint.last_completed.checked_sub(1) {
            Some(prev) => self
                .storage
                .block()
                .get_block_at_async(prev)
                .await?
                .map(|b| *b.checksum_root())
                .unwrap_or_default(),
            None => Buf32::zero(),
        };

        for height in checkpoint.last_completed..=checkpoint.target {
            if self.shutdown.should_shutdown() {
                return Ok(false);
            }

            let block = self
                .storage
                .block()
                .get_block_at_async(height)
                .await?
                .ok_or(IndexerError::MissingBlock(height))?;

            let root = compute_checksum_root(
                block.block_hash(),
                block.prev_hash(),
                block.merkle_root(),
                block.receipt_root(),
                block.storage_root(),
                &prev_checksum,
            );
            self.storage
                .block()
                .set_block_checksum_async(height, root, vec![root.as_slice().to_vec()])
                .await?;
            prev_checksum = root;

            checkpoint.last_completed = height;
            since_checkpoint += 1;
            if since_checkpoint >= self.config.checkpoint_interval {
                since_checkpoint = 0;
                self.save(checkpoint).await?;
            }
        }

        self.save(checkpoint).await?;
        Ok(true)
    }

    /// Parallel body fetch; bodies below the UTXO indexing floor are
    /// skipped wholesale.
    async fn run_transaction_download(&self, checkpoint: &mut IbdCheckpoint) -> IndexerResult<bool> {
        let floor = self.params.overlay().start_indexing_utxos_at;
        let mut next = checkpoint.last_completed.max(floor);
        if checkpoint.target < floor {
            info!(%floor, "body download entirely below indexing floor, skipping");
            checkpoint.last_completed = checkpoint.target;
            self.save(checkpoint).await?;
            return Ok(true);
        }

        let overlay_params = Arc::new(self.params.overlay().clone());
        let mut since_checkpoint = 0u64;

        while next <= checkpoint.target {
            if self.shutdown.should_shutdown() {
                return Ok(false);
            }

            let batch_end = (next + self.config.header_batch_size - 1).min(checkpoint.target);
            let heights: Vec<u64> = (next..=batch_end).collect();

            for chunk in heights.chunks(self.config.worker_count.max(1)) {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|&height| {
                        let client = self.client.clone();
                        let params = overlay_params.clone();
                        tokio::spawn(async move {
                            let block = client.get_block_at(height).await;
                            block.map(|b| (height, build_ibd_tx_records(height, &b, &params)))
                        })
                    })
                    .collect();

                for handle in handles {
                    let res = handle
                        .await
                        .map_err(|e| IndexerError::Other(format!("body fetch join: {e}")))?;
                    let (height, txs) =
                        res.map_err(|e| IndexerError::Other(format!("body fetch: {e}")))?;
                    self.storage.tx().put_block_txs_async(height, txs).await?;
                }
            }

            since_checkpoint += batch_end - next + 1;
            checkpoint.last_completed = batch_end;
            if since_checkpoint >= self.config.checkpoint_interval {
                since_checkpoint = 0;
                self.save(checkpoint).await?;
            }
            next = batch_end + 1;
        }

        self.save(checkpoint).await?;
        Ok(true)
    }

    async fn run_witness_sync(&self, checkpoint: &mut IbdCheckpoint) -> IndexerResult<bool> {
        let Some(fetcher) = (self.config.sync_witnesses)
            .then_some(self.witness_fetcher.as_ref())
            .flatten()
        else {
            debug!("witness sync disabled during bulk import, skipping phase");
            checkpoint.last_completed = checkpoint.target;
            self.save(checkpoint).await?;
            return Ok(true);
        };

        let mut next = checkpoint.last_completed;
        while next <= checkpoint.target {
            if self.shutdown.should_shutdown() {
                return Ok(false);
            }
            let batch_end = (next + self.config.header_batch_size - 1).min(checkpoint.target);
            for witness in fetcher.fetch_range(next, batch_end + 1).await {
                self.storage.witness().insert_witness_async(witness).await?;
            }
            checkpoint.last_completed = batch_end;
            self.save(checkpoint).await?;
            next = batch_end + 1;
        }
        Ok(true)
    }

    /// Sequential epoch rebuild over the imported range.
    async fn run_epoch_finalization(&self, checkpoint: &mut IbdCheckpoint) -> IndexerResult<bool> {
        let blocks_per_epoch = self.params.overlay().blocks_per_epoch;
        let tracker = EpochTracker::new(self.storage.epoch().clone(), blocks_per_epoch);

        let first_epoch = checkpoint.last_completed / blocks_per_epoch;
        let last_epoch = checkpoint.target / blocks_per_epoch;

        for epoch in first_epoch..=last_epoch {
            if self.shutdown.should_shutdown() {
                return Ok(false);
            }

            let (start, end) = epoch_range(epoch, blocks_per_epoch);
            if start > checkpoint.target {
                break;
            }
            let open_root = self.checksum_at(start).await?;
            tracker.on_block_committed(start, open_root).await?;

            // Only finalize epochs whose whole range is inside the import.
            if end <= checkpoint.target {
                let close_root = self.checksum_at(end).await?;
                tracker.on_block_committed(end, close_root).await?;
                checkpoint.last_completed = end;
                self.save(checkpoint).await?;
            }
        }

        checkpoint.last_completed = checkpoint.target;
        self.save(checkpoint).await?;
        Ok(true)
    }

    async fn checksum_at(&self, height: u64) -> IndexerResult<Buf32> {
        Ok(self
            .storage
            .block()
            .get_block_at_async(height)
            .await?
            .map(|b| *b.checksum_root())
            .ok_or(IndexerError::MissingBlock(height))?)
    }

    async fn save(&self, checkpoint: &IbdCheckpoint) -> IndexerResult<()> {
        self.storage
            .checkpoint()
            .put_checkpoint_async(checkpoint.clone())
            .await?;
        Ok(())
    }
}

/// Header-only block record; body-derived fields arrive in later phases.
fn header_record(height: u64, header: &bitcoin::block::Header) -> BlockRecord {
    BlockRecord::new(
        height,
        Buf32::from(header.block_hash().to_byte_array()),
        Buf32::from(header.prev_blockhash.to_byte_array()),
        Buf32::from(header.merkle_root.to_byte_array()),
        Buf32::zero(),
        Buf32::zero(),
        Buf32::zero(),
        vec![],
        0,
        serialize(header),
    )
}

#[cfg(test)]
mod tests {
    use tapnet_btcio::test_utils::TestReader;
    use tapnet_primitives::params::regtest_params;
    use tapnet_rocksdb::test_utils::get_common_db;
    use tapnet_storage::create_node_storage;
    use tapnet_tasks::ShutdownSignal;

    use super::*;

    fn test_config() -> IbdConfig {
        IbdConfig {
            enabled: true,
            threshold: 5,
            header_batch_size: 4,
            worker_count: 2,
            checkpoint_interval: 6,
            sync_witnesses: false,
        }
    }

    fn setup(chain_len: usize) -> (Arc<TestReader>, Arc<NodeStorage>, IbdCoordinator<TestReader>) {
        let reader = Arc::new(TestReader::with_chain_len(chain_len));
        let pool = threadpool::Builder::new().num_threads(2).build();
        let storage = Arc::new(create_node_storage(get_common_db(), pool));
        let params = Arc::new(regtest_params());
        let coordinator = IbdCoordinator::new(
            reader.clone(),
            storage.clone(),
            params,
            test_config(),
            None,
            ShutdownSignal::new().subscribe(),
        );
        (reader, storage, coordinator)
    }

    #[tokio::test]
    async fn test_full_import_reaches_complete() {
        let (_reader, storage, coordinator) = setup(21);

        let outcome = coordinator.run(20).await.unwrap();
        assert_eq!(outcome, IbdOutcome::Completed);

        // Headers landed.
        assert_eq!(storage.block().get_chain_tip_async().await.unwrap(), Some(20));

        // Checksums chain.
        let b5 = storage
            .block()
            .get_block_at_async(5)
            .await
            .unwrap()
            .unwrap();
        let b4 = storage
            .block()
            .get_block_at_async(4)
            .await
            .unwrap()
            .unwrap();
        assert!(b5.has_checksum());
        let expected = compute_checksum_root(
            b5.block_hash(),
            b5.prev_hash(),
            b5.merkle_root(),
            b5.receipt_root(),
            b5.storage_root(),
            b4.checksum_root(),
        );
        assert_eq!(*b5.checksum_root(), expected);

        // Checkpoint ended at Complete.
        let cp = storage
            .checkpoint()
            .get_checkpoint_async()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.phase, IbdPhase::Complete);

        // Epochs over the whole range finalized (5 blocks per epoch).
        let epoch0 = storage.epoch().get_epoch_async(0).await.unwrap().unwrap();
        assert!(!epoch0.is_active());
        assert_eq!(epoch0.end_block, 4);
    }

    #[tokio::test]
    async fn test_resume_with_missing_checksum_restarts_phase() {
        let (_reader, storage, coordinator) = setup(21);

        // Simulate a crashed checksum phase: headers exist, checkpoint
        // claims progress to 10, but block 10 has no checksum.
        coordinator.run_headers_for_test(20).await;
        storage
            .checkpoint()
            .put_checkpoint_async(IbdCheckpoint {
                phase: IbdPhase::ChecksumGeneration,
                last_completed: 10,
                original_start: 0,
                target: 20,
            })
            .await
            .unwrap();

        let resolved = coordinator.resolve_checkpoint(0, 20).await.unwrap();
        assert_eq!(resolved.phase, IbdPhase::ChecksumGeneration);
        assert_eq!(
            resolved.last_completed, 0,
            "missing checksum at the boundary restarts the phase"
        );
    }

    #[tokio::test]
    async fn test_resume_trusts_checksum_when_present() {
        let (_reader, storage, coordinator) = setup(21);

        coordinator.run_headers_for_test(20).await;
        storage
            .block()
            .set_block_checksum_async(10, Buf32::from([1; 32]), vec![])
            .await
            .unwrap();
        storage
            .checkpoint()
            .put_checkpoint_async(IbdCheckpoint {
                phase: IbdPhase::ChecksumGeneration,
                last_completed: 10,
                original_start: 0,
                target: 20,
            })
            .await
            .unwrap();

        let resolved = coordinator.resolve_checkpoint(0, 20).await.unwrap();
        assert_eq!(resolved.last_completed, 10);
    }

    #[tokio::test]
    async fn test_stale_checkpoint_discarded_when_storage_behind() {
        let (_reader, storage, coordinator) = setup(21);

        storage
            .checkpoint()
            .put_checkpoint_async(IbdCheckpoint {
                phase: IbdPhase::TransactionDownload,
                last_completed: 500,
                original_start: 100,
                target: 1000,
            })
            .await
            .unwrap();

        // No stored headers at all; original_start=100 > nothing.
        let resolved = coordinator.resolve_checkpoint(0, 20).await.unwrap();
        assert_eq!(resolved.phase, IbdPhase::HeaderDownload);
        assert_eq!(resolved.original_start, 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_batch_boundary() {
        let reader = Arc::new(TestReader::with_chain_len(21));
        let pool = threadpool::Builder::new().num_threads(2).build();
        let storage = Arc::new(create_node_storage(get_common_db(), pool));
        let signal = ShutdownSignal::new();
        let coordinator = IbdCoordinator::new(
            reader,
            storage,
            Arc::new(regtest_params()),
            test_config(),
            None,
            signal.subscribe(),
        );

        signal.send();
        let outcome = coordinator.run(20).await.unwrap();
        assert_eq!(outcome, IbdOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_gate_respects_threshold_and_network() {
        let (_reader, _storage, coordinator) = setup(21);

        // Regtest network always refuses bulk import.
        assert!(!coordinator.should_run(10_000, Some(0)));
    }

    impl IbdCoordinator<TestReader> {
        /// Test helper: run just the header phase over 0..=target.
        async fn run_headers_for_test(&self, target: u64) {
            let mut cp = IbdCheckpoint {
                phase: IbdPhase::HeaderDownload,
                last_completed: 0,
                original_start: 0,
                target,
            };
            self.run_header_download(&mut cp).await.unwrap();
        }
    }
}
