//! Per-block indexing task and the commit pipeline it runs through.
//!
//! Tasks move Prefetching → Parsing → AwaitingReorgCheck → Committing →
//! Done, or short-circuit to Cancelled.  Parsing fans out to the worker
//! pool; commits are strictly serialized through the [`CommitGate`].

use std::sync::Arc;

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Block, Transaction};
use tapnet_btcio::prefetch::BlockPrefetcher;
use tapnet_btcio::ReaderRpc;
use tapnet_db::types::AnyoneCanSpendRecord;
use tapnet_primitives::block::{compute_checksum_root, BlockRecord};
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::params::Params;
use tapnet_primitives::tx::{TransactionRecord, TxInput, TxOutput, TxPayload};
use tapnet_storage::NodeStorage;
use tapnet_tx_parser::parser::compute_burned_value;
use tokio::sync::broadcast;
use tracing::*;

use crate::epochs::EpochTracker;
use crate::errors::{IndexerError, IndexerResult};
use crate::gate::CommitGate;
use crate::messages::ChainEvent;
use crate::parse_pool::ParsePool;
use crate::vm::VmHook;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    Prefetching,
    Parsing,
    AwaitingReorgCheck,
    Committing,
    Done,
    Cancelled,
}

/// One candidate block moving through the pipeline.
#[derive(Debug)]
pub struct IndexingTask {
    height: u64,
    state: TaskState,
    cancelled_by_reorg: bool,
}

impl IndexingTask {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            state: TaskState::Prefetching,
            cancelled_by_reorg: false,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Idempotent cancellation; `reorged` records why.
    pub fn cancel(&mut self, reorged: bool) {
        if self.state != TaskState::Cancelled {
            self.state = TaskState::Cancelled;
            self.cancelled_by_reorg = reorged;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == TaskState::Cancelled
    }
}

/// What processing a task produced.
#[derive(Debug)]
pub enum Processed {
    /// Block committed; cursor may advance.
    Committed,

    /// RPC gap; retry the same height later.
    NoBlockYet,

    /// The fetched block does not extend our tip; run the watchdog.
    LinkageBroken,

    Cancelled,
}

/// Everything a task needs to push one block through parse and commit.
pub struct BlockPipeline<V: VmHook> {
    storage: Arc<NodeStorage>,
    parse_pool: Arc<ParsePool>,
    vm: Arc<V>,
    epochs: EpochTracker,
    gate: CommitGate,
    params: Arc<Params>,
    event_tx: broadcast::Sender<ChainEvent>,
}

impl<V: VmHook> BlockPipeline<V> {
    pub fn new(
        storage: Arc<NodeStorage>,
        parse_pool: Arc<ParsePool>,
        vm: Arc<V>,
        epochs: EpochTracker,
        params: Arc<Params>,
        event_tx: broadcast::Sender<ChainEvent>,
    ) -> Self {
        Self {
            storage,
            parse_pool,
            vm,
            epochs,
            gate: CommitGate::new(),
            params,
            event_tx,
        }
    }

    pub fn events(&self) -> broadcast::Sender<ChainEvent> {
        self.event_tx.clone()
    }

    /// Drives one task through the pipeline.
    pub async fn process<C: ReaderRpc>(
        &self,
        task: &mut IndexingTask,
        prefetcher: &mut BlockPrefetcher<C>,
        chain_tip: u64,
    ) -> IndexerResult<Processed> {
        if task.is_cancelled() {
            return Ok(Processed::Cancelled);
        }

        task.state = TaskState::Prefetching;
        let Some(block) = prefetcher.get(task.height, chain_tip).await else {
            return Ok(Processed::NoBlockYet);
        };

        if task.is_cancelled() {
            return Ok(Processed::Cancelled);
        }

        task.state = TaskState::Parsing;
        let txs = self.parse_block_txs(task.height, &block).await?;

        task.state = TaskState::AwaitingReorgCheck;
        let prev = match task.height.checked_sub(1) {
            Some(prev_height) => self.storage.block().get_block_at_async(prev_height).await?,
            None => None,
        };
        if let Some(prev) = &prev {
            let actual_prev = Buf32::from(block.header.prev_blockhash.to_byte_array());
            if actual_prev != *prev.block_hash() {
                warn!(
                    height = %task.height,
                    "fetched block does not extend our committed tip"
                );
                return Ok(Processed::LinkageBroken);
            }
        }

        if task.is_cancelled() {
            return Ok(Processed::Cancelled);
        }

        task.state = TaskState::Committing;
        self.commit(task.height, &block, txs, prev.as_ref()).await?;
        task.state = TaskState::Done;
        Ok(Processed::Committed)
    }

    /// Fans the block's transactions out to the parse pool, round-robin,
    /// and reassembles records in block order.
    async fn parse_block_txs(
        &self,
        height: u64,
        block: &Block,
    ) -> IndexerResult<Vec<TransactionRecord>> {
        let overlay_params = Arc::new(self.params.overlay().clone());

        let receivers: Vec<_> = block
            .txdata
            .iter()
            .map(|tx| {
                self.parse_pool
                    .dispatch(tx.clone(), 0, overlay_params.clone())
            })
            .collect();

        let mut records = Vec::with_capacity(receivers.len());
        for (idx, rx) in receivers.into_iter().enumerate() {
            let outcome = rx
                .await
                .map_err(|_| IndexerError::ParseWorker("worker died mid-request".to_string()))?;
            let parsed = outcome.map_err(IndexerError::ParseWorker)?;
            let tx = &block.txdata[idx];
            records.push(build_tx_record(
                tx,
                height,
                idx as u32,
                parsed,
                self.params.overlay().network,
            ));
        }
        Ok(records)
    }

    async fn commit(
        &self,
        height: u64,
        block: &Block,
        mut txs: Vec<TransactionRecord>,
        prev: Option<&BlockRecord>,
    ) -> IndexerResult<()> {
        let _permit = self.gate.acquire();

        self.vm.prepare(height);
        let outcome = self.vm.execute(height, &txs);
        for (tx, gas) in txs.iter_mut().zip(&outcome.gas_used) {
            tx.set_gas_used(*gas);
        }

        let block_hash = Buf32::from(block.block_hash().to_byte_array());
        let prev_hash = Buf32::from(block.header.prev_blockhash.to_byte_array());
        let merkle_root = Buf32::from(block.header.merkle_root.to_byte_array());
        let prev_checksum = prev.map(|p| *p.checksum_root()).unwrap_or_default();

        let checksum_root = compute_checksum_root(
            &block_hash,
            &prev_hash,
            &merkle_root,
            &outcome.receipt_root,
            &outcome.storage_root,
            &prev_checksum,
        );

        let record = BlockRecord::new(
            height,
            block_hash,
            prev_hash,
            merkle_root,
            outcome.receipt_root,
            outcome.storage_root,
            checksum_root,
            vec![checksum_root.as_slice().to_vec()],
            block.txdata.len() as u32,
            serialize(&block.header),
        );

        let acs_outputs = collect_anyone_can_spend(height, &txs);

        self.storage.block().put_block_async(record).await?;
        self.storage
            .tx()
            .put_block_txs_async(height, txs)
            .await?;
        if !acs_outputs.is_empty() {
            self.storage
                .acs()
                .put_outputs_async(height, acs_outputs)
                .await?;
        }
        self.epochs.on_block_committed(height, checksum_root).await?;
        self.vm.finalize(height);

        info!(%height, %block_hash, "committed block");
        let _ = self.event_tx.send(ChainEvent::BlockCommitted {
            height,
            block_hash,
            prev_hash,
            checksum_root,
            prev_checksum,
        });
        Ok(())
    }
}

/// Converts one base-chain transaction plus its parse outcome into the
/// record we persist.
fn build_tx_record(
    tx: &Transaction,
    height: u64,
    index_in_block: u32,
    parsed: Option<tapnet_tx_parser::ParsedOverlay>,
    network: bitcoin::Network,
) -> TransactionRecord {
    let inputs = tx
        .input
        .iter()
        .map(|inp| TxInput {
            prev_txid: Buf32::from(inp.previous_output.txid.to_byte_array()),
            prev_vout: inp.previous_output.vout,
            witness: inp.witness.iter().map(|item| item.to_vec()).collect(),
        })
        .collect();

    let outputs = tx
        .output
        .iter()
        .map(|out| TxOutput {
            value: out.value.to_sat(),
            script_pubkey: out.script_pubkey.to_bytes(),
            address: Address::from_script(&out.script_pubkey, network)
                .ok()
                .map(|a| a.to_string()),
        })
        .collect();

    let (from, contract_address, payload) = match parsed {
        Some(p) => (Some(p.from), Some(p.contract_address), p.payload),
        None => (None, None, TxPayload::Generic),
    };

    let mut record = TransactionRecord::new(
        Buf32::from(tx.compute_txid().to_byte_array()),
        height,
        index_in_block,
        inputs,
        outputs,
        from,
        contract_address,
        payload,
    );
    record.set_burned_value(compute_burned_value(tx));
    record
}

/// Inline record building for the bulk import body phase, which parses on
/// the fetch task instead of the live parse pool.
pub fn build_ibd_tx_records(
    height: u64,
    block: &Block,
    params: &tapnet_primitives::params::OverlayParams,
) -> Vec<TransactionRecord> {
    block
        .txdata
        .iter()
        .enumerate()
        .map(|(idx, tx)| {
            let parsed = tapnet_tx_parser::parse_overlay_tx(tx, 0, params)
                .ok()
                .flatten();
            build_tx_record(tx, height, idx as u32, parsed, params.network)
        })
        .collect()
}

/// Anyone-can-spend outputs are bare OP_TRUE scripts left as wrap change.
fn collect_anyone_can_spend(height: u64, txs: &[TransactionRecord]) -> Vec<AnyoneCanSpendRecord> {
    const OP_TRUE: u8 = 0x51;
    let mut out = Vec::new();
    for tx in txs {
        for (vout, output) in tx.outputs().iter().enumerate() {
            if output.script_pubkey == [OP_TRUE] {
                out.push(AnyoneCanSpendRecord {
                    txid: *tx.txid(),
                    vout: vout as u32,
                    value: output.value,
                    block_height: height,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_cancel_is_idempotent() {
        let mut task = IndexingTask::new(42);
        assert_eq!(task.state(), TaskState::Prefetching);

        task.cancel(true);
        assert!(task.is_cancelled());
        assert!(task.cancelled_by_reorg);

        // Second cancel with a different flag must not overwrite the cause.
        task.cancel(false);
        assert!(task.cancelled_by_reorg);
    }
}
