//! The indexer worker loop: bulk import gate, then the steady-state
//! fetch/parse/commit pipeline with reorg recovery.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tapnet_btcio::prefetch::BlockPrefetcher;
use tapnet_btcio::tip::ChainTip;
use tapnet_btcio::ReaderRpc;
use tapnet_config::{IbdConfig, SyncConfig};
use tapnet_primitives::block::ReorgRecord;
use tapnet_primitives::params::Params;
use tapnet_status::StatusChannel;
use tapnet_storage::NodeStorage;
use tapnet_tasks::{ShutdownGuard, TaskExecutor};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::*;

use crate::epochs::EpochTracker;
use crate::errors::{IndexerError, IndexerResult};
use crate::handle::IndexerHandle;
use crate::ibd::{IbdCoordinator, IbdOutcome};
use crate::messages::{ChainEvent, IndexerMessage, ValidateHeadersResponse};
use crate::parse_pool::ParsePool;
use crate::task::{BlockPipeline, IndexingTask, Processed};
use crate::vm::VmHook;
use crate::watchdog::{detect_reorg, ReorgEvent};

/// Capacity of the chain event fanout; slow consumers miss events rather
/// than stall commits.
const EVENT_CHANNEL_CAPACITY: usize = 256;

const MSG_CHANNEL_CAPACITY: usize = 64;

/// Pause between retries when the RPC leaves a gap.
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct IndexerContext<C, V> {
    pub client: Arc<C>,
    pub storage: Arc<NodeStorage>,
    pub params: Arc<Params>,
    pub sync_config: SyncConfig,
    pub ibd_config: IbdConfig,
    pub vm: Arc<V>,
    pub status: StatusChannel,
}

/// Spawns the indexer worker and returns its handle.
pub fn start_indexer_worker<C, V>(
    executor: &TaskExecutor,
    ctx: IndexerContext<C, V>,
    tip_rx: watch::Receiver<ChainTip>,
    shutdown: ShutdownGuard,
) -> IndexerHandle
where
    C: ReaderRpc,
    V: VmHook,
{
    let (msg_tx, msg_rx) = mpsc::channel(MSG_CHANNEL_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let handle = IndexerHandle::new(msg_tx, event_tx.clone());

    executor.spawn_critical_async("indexer-worker", async move {
        let worker = IndexerWorker::new(ctx, event_tx, shutdown);
        worker.run(msg_rx, tip_rx).await.map_err(Into::into)
    });

    handle
}

struct IndexerWorker<C, V: VmHook> {
    client: Arc<C>,
    storage: Arc<NodeStorage>,
    params: Arc<Params>,
    sync_config: SyncConfig,
    ibd_config: IbdConfig,
    status: StatusChannel,
    pipeline: BlockPipeline<V>,
    event_tx: broadcast::Sender<ChainEvent>,
    shutdown: ShutdownGuard,
}

impl<C: ReaderRpc, V: VmHook> IndexerWorker<C, V> {
    fn new(
        ctx: IndexerContext<C, V>,
        event_tx: broadcast::Sender<ChainEvent>,
        shutdown: ShutdownGuard,
    ) -> Self {
        let epochs = EpochTracker::new(
            ctx.storage.epoch().clone(),
            ctx.params.overlay().blocks_per_epoch,
        )
        .with_pubkey_registry(ctx.storage.pubkey().clone());
        let pipeline = BlockPipeline::new(
            ctx.storage.clone(),
            Arc::new(ParsePool::with_hardware_concurrency()),
            ctx.vm,
            epochs,
            ctx.params.clone(),
            event_tx.clone(),
        );
        Self {
            client: ctx.client,
            storage: ctx.storage,
            params: ctx.params,
            sync_config: ctx.sync_config,
            ibd_config: ctx.ibd_config,
            status: ctx.status,
            pipeline,
            event_tx,
            shutdown,
        }
    }

    async fn run(
        mut self,
        mut msg_rx: mpsc::Receiver<IndexerMessage>,
        mut tip_rx: watch::Receiver<ChainTip>,
    ) -> IndexerResult<()> {
        let mut committed = self.storage.block().get_chain_tip_async().await?;
        let mut chain_tip = tip_rx.borrow().height;
        info!(?committed, %chain_tip, "indexer worker starting");

        // Bulk import fast path before the live pipeline.
        let coordinator = IbdCoordinator::new(
            self.client.clone(),
            self.storage.clone(),
            self.params.clone(),
            self.ibd_config.clone(),
            None,
            self.shutdown.clone(),
        );
        if coordinator.should_run(chain_tip, committed) {
            self.status.modify_sync_status(|s| s.in_ibd = true);
            let outcome = coordinator.run(chain_tip).await?;
            self.status.modify_sync_status(|s| s.in_ibd = false);
            if outcome == IbdOutcome::Cancelled {
                return Ok(());
            }
            committed = self.storage.block().get_chain_tip_async().await?;
        }

        let mut prefetcher = BlockPrefetcher::new(
            self.client.clone(),
            self.sync_config.max_prefetch_blocks,
        );
        let mut next_height = committed.map(|c| c + 1).unwrap_or(0);
        let mut shutdown_rx = self.shutdown.clone();

        loop {
            if self.shutdown.should_shutdown() {
                info!("indexer worker shutting down");
                return Ok(());
            }

            // Non-blocking message and tip drains between work units.
            while let Ok(msg) = msg_rx.try_recv() {
                self.handle_message(msg, committed).await;
            }
            if tip_rx.has_changed().unwrap_or(false) {
                chain_tip = tip_rx.borrow_and_update().height;
                // A fresh header is the reorg watchdog's cue.
                if let Some(committed_height) = committed {
                    if let Some(event) = detect_reorg(
                        self.client.as_ref(),
                        self.storage.block(),
                        committed_height,
                        self.sync_config.max_reorg_depth,
                    )
                    .await?
                    {
                        let resume = self.recover_from_reorg(&event, &mut prefetcher).await?;
                        committed = resume.checked_sub(1);
                        next_height = resume;
                        continue;
                    }
                }
            }

            if next_height > chain_tip {
                self.status.modify_sync_status(|s| {
                    s.committed_height = committed.unwrap_or(0);
                    s.target_height = chain_tip;
                    s.synced = true;
                });
                tokio::select! {
                    _ = shutdown_rx.wait_for_shutdown() => continue,
                    maybe_msg = msg_rx.recv() => {
                        if let Some(msg) = maybe_msg {
                            self.handle_message(msg, committed).await;
                        }
                    }
                    _ = tip_rx.changed() => {}
                }
                continue;
            }

            let mut task = IndexingTask::new(next_height);
            match self
                .pipeline
                .process(&mut task, &mut prefetcher, chain_tip)
                .await
            {
                Ok(Processed::Committed) => {
                    committed = Some(next_height);
                    next_height += 1;
                    self.status.modify_sync_status(|s| {
                        s.committed_height = next_height - 1;
                        s.target_height = chain_tip;
                        s.synced = next_height > chain_tip;
                    });
                }
                Ok(Processed::NoBlockYet) => {
                    tokio::time::sleep(FETCH_RETRY_DELAY).await;
                }
                Ok(Processed::LinkageBroken) => {
                    let Some(committed_height) = committed else {
                        // Genesis can't reorg; the RPC fed us garbage.
                        tokio::time::sleep(FETCH_RETRY_DELAY).await;
                        continue;
                    };
                    match detect_reorg(
                        self.client.as_ref(),
                        self.storage.block(),
                        committed_height,
                        self.sync_config.max_reorg_depth,
                    )
                    .await?
                    {
                        Some(event) => {
                            task.cancel(true);
                            let resume =
                                self.recover_from_reorg(&event, &mut prefetcher).await?;
                            committed = resume.checked_sub(1);
                            next_height = resume;
                        }
                        None => {
                            // Chain agrees with us; the fetched block was
                            // stale. Flush and retry.
                            prefetcher.purge();
                            tokio::time::sleep(FETCH_RETRY_DELAY).await;
                        }
                    }
                }
                Ok(Processed::Cancelled) => {}
                Err(e) => {
                    let resume = self.recover_from_corruption(committed, e).await?;
                    committed = resume.checked_sub(1);
                    next_height = resume;
                    prefetcher.purge();
                }
            }
        }
    }

    async fn handle_message(&self, msg: IndexerMessage, committed: Option<u64>) {
        match msg {
            IndexerMessage::CurrentBlock(resp) => {
                let _ = resp.send(committed.unwrap_or(0));
            }
            IndexerMessage::ValidateBlockHeaders {
                height,
                claimed_checksum,
                resp,
            } => {
                let stored = self
                    .storage
                    .block()
                    .get_block_at_async(height)
                    .await
                    .ok()
                    .flatten();
                let has_valid_proofs = stored
                    .as_ref()
                    .map(|b| b.has_checksum() && *b.checksum_root() == claimed_checksum)
                    .unwrap_or(false);
                let _ = resp.send(ValidateHeadersResponse {
                    stored_block_header: stored,
                    has_valid_proofs,
                });
            }
        }
    }

    /// The full recovery sequence from §reorg: lock, cancel, notify, drain,
    /// revert, mark, unlock.  Returns the height indexing resumes from.
    async fn recover_from_reorg(
        &self,
        event: &ReorgEvent,
        prefetcher: &mut BlockPrefetcher<C>,
    ) -> IndexerResult<u64> {
        warn!(
            from = %event.from_height,
            to = %event.to_height,
            "recovering from base-chain reorg"
        );
        self.status.modify_sync_status(|s| s.in_reorg = true);

        prefetcher.purge();

        let _ = self.event_tx.send(ChainEvent::Reorg {
            from_height: event.from_height,
            to_height: event.to_height,
        });

        // Nothing may land after the deletes start.
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.drain_pending_writes())
            .await
            .map_err(|e| IndexerError::Other(format!("drain join: {e}")))?;

        let new_tip = event.from_height.saturating_sub(1);
        self.revert_all(new_tip).await?;

        self.storage
            .reorg()
            .put_reorg_async(ReorgRecord {
                from_block: event.from_height,
                to_block: event.to_height,
                timestamp: now_millis(),
            })
            .await?;

        self.status.modify_sync_status(|s| {
            s.in_reorg = false;
            s.committed_height = new_tip;
        });
        info!(resume = %event.from_height, "reorg recovery finished");
        Ok(event.from_height)
    }

    /// Commit failure without a reorg in flight: revert one block and
    /// resync.  A revert target of zero means even genesis is suspect.
    async fn recover_from_corruption(
        &self,
        committed: Option<u64>,
        cause: IndexerError,
    ) -> IndexerResult<u64> {
        let committed_height = committed.unwrap_or(0);
        error!(err = %cause, %committed_height, "commit failed, treating as local corruption");

        if committed_height == 0 {
            panic!("indexer: corruption at genesis, cannot revert further: {cause}");
        }

        let new_tip = committed_height - 1;
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.drain_pending_writes())
            .await
            .map_err(|e| IndexerError::Other(format!("drain join: {e}")))?;
        self.revert_all(new_tip).await?;

        Ok(committed_height)
    }

    /// Deletes every height-keyed row above `new_tip` across all tables the
    /// indexer owns.
    async fn revert_all(&self, new_tip: u64) -> IndexerResult<()> {
        self.storage.block().revert_to_height_async(new_tip).await?;
        self.storage.tx().revert_to_height_async(new_tip).await?;
        self.storage
            .witness()
            .revert_to_height_async(new_tip)
            .await?;
        self.storage.epoch().revert_to_height_async(new_tip).await?;
        self.storage
            .pubkey()
            .revert_to_height_async(new_tip)
            .await?;
        self.storage.acs().revert_to_height_async(new_tip).await?;
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}
