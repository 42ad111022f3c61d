//! The mempool worker loop and its admission pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitcoin::hashes::Hash;
use tapnet_btcio::{BroadcasterRpc, MempoolRpc};
use tapnet_config::MempoolConfig;
use tapnet_db::types::{MempoolEntry, MempoolInput, MempoolOutput};
use tapnet_indexer::ChainEvent;
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::constants::{MEMPOOL_MAX_PSBT_SIZE, MEMPOOL_MAX_TX_SIZE};
use tapnet_primitives::params::Params;
use tapnet_primitives::tx::{TxKind, TxPayload};
use tapnet_rpc_types::{BroadcastTxResponse, MempoolFees};
use tapnet_status::StatusChannel;
use tapnet_storage::{MempoolOps, TxDataOps};
use tapnet_tasks::{ShutdownGuard, TaskExecutor};
use tapnet_tx_parser::parser::compute_burned_value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::*;

use crate::errors::{MempoolError, MempoolResult};
use crate::fees::refresh_fees;
use crate::verifier::{verify_submission, VerifiedTx};

/// Flat gas assumption per calldata byte for the theoretical limit.
const GAS_PER_CALLDATA_BYTE: u64 = 16;

const MSG_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug)]
pub enum MempoolMessage {
    SubmitTx {
        raw: Vec<u8>,
        psbt: bool,
        id: Option<Buf32>,
        resp: oneshot::Sender<BroadcastTxResponse>,
    },
    GetFees {
        resp: oneshot::Sender<MempoolFees>,
    },
}

#[derive(Clone)]
pub struct MempoolHandle {
    msg_tx: mpsc::Sender<MempoolMessage>,
}

impl MempoolHandle {
    pub async fn submit_transaction(
        &self,
        raw: Vec<u8>,
        psbt: bool,
        id: Option<Buf32>,
    ) -> BroadcastTxResponse {
        let (resp_tx, resp_rx) = oneshot::channel();
        let msg = MempoolMessage::SubmitTx {
            raw,
            psbt,
            id,
            resp: resp_tx,
        };
        if self.msg_tx.send(msg).await.is_err() {
            return BroadcastTxResponse::rejected("mempool worker unavailable");
        }
        resp_rx
            .await
            .unwrap_or_else(|_| BroadcastTxResponse::rejected("mempool worker unavailable"))
    }

    pub async fn get_fees(&self) -> Option<MempoolFees> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.msg_tx
            .send(MempoolMessage::GetFees { resp: resp_tx })
            .await
            .ok()?;
        resp_rx.await.ok()
    }
}

pub struct MempoolContext<C> {
    pub client: Arc<C>,
    pub mempool_ops: Arc<MempoolOps>,
    pub tx_ops: Arc<TxDataOps>,
    pub params: Arc<Params>,
    pub config: MempoolConfig,
    pub status: StatusChannel,
}

pub fn start_mempool_worker<C>(
    executor: &TaskExecutor,
    ctx: MempoolContext<C>,
    chain_events: broadcast::Receiver<ChainEvent>,
    shutdown: ShutdownGuard,
) -> MempoolHandle
where
    C: BroadcasterRpc + MempoolRpc,
{
    let (msg_tx, msg_rx) = mpsc::channel(MSG_CHANNEL_CAPACITY);
    let handle = MempoolHandle { msg_tx };

    executor.spawn_critical_async("mempool-worker", async move {
        let worker = MempoolWorker::new(ctx);
        worker.run(msg_rx, chain_events, shutdown).await
    });

    handle
}

struct MempoolWorker<C> {
    client: Arc<C>,
    mempool_ops: Arc<MempoolOps>,
    tx_ops: Arc<TxDataOps>,
    params: Arc<Params>,
    config: MempoolConfig,
    status: StatusChannel,
}

impl<C: BroadcasterRpc + MempoolRpc> MempoolWorker<C> {
    fn new(ctx: MempoolContext<C>) -> Self {
        Self {
            client: ctx.client,
            mempool_ops: ctx.mempool_ops,
            tx_ops: ctx.tx_ops,
            params: ctx.params,
            config: ctx.config,
            status: ctx.status,
        }
    }

    async fn run(
        self,
        mut msg_rx: mpsc::Receiver<MempoolMessage>,
        mut chain_events: broadcast::Receiver<ChainEvent>,
        shutdown: ShutdownGuard,
    ) -> anyhow::Result<()> {
        let mut fees = refresh_fees(self.client.as_ref()).await;
        let mut fee_interval =
            tokio::time::interval(Duration::from_secs(self.config.fee_refresh_interval_secs));
        let mut shutdown_rx = shutdown.clone();
        info!("mempool worker up");

        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for_shutdown() => {
                    info!("mempool worker shutting down");
                    return Ok(());
                }

                Some(msg) = msg_rx.recv() => match msg {
                    MempoolMessage::SubmitTx { raw, psbt, id, resp } => {
                        let response = self.handle_submit(raw, psbt, id).await;
                        let _ = resp.send(response);
                    }
                    MempoolMessage::GetFees { resp } => {
                        let _ = resp.send(fees);
                    }
                },

                event = chain_events.recv() => match event {
                    Ok(ChainEvent::BlockCommitted { height, .. }) => {
                        if let Err(e) = self.on_block_committed(height).await {
                            warn!(err = %e, "mempool block-change sweep failed");
                        }
                        fees = refresh_fees(self.client.as_ref()).await;
                    }
                    Ok(ChainEvent::Reorg { from_height, .. }) => {
                        let cutoff = from_height.saturating_sub(1);
                        match self
                            .mempool_ops
                            .delete_greater_than_block_height_async(cutoff)
                            .await
                        {
                            Ok(removed) => {
                                info!(%removed, %cutoff, "mempool entries dropped by reorg")
                            }
                            Err(e) => warn!(err = %e, "mempool reorg sweep failed"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%skipped, "mempool lagged the chain event feed");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("chain event feed closed, mempool exiting");
                        return Ok(());
                    }
                },

                _ = fee_interval.tick() => {
                    fees = refresh_fees(self.client.as_ref()).await;
                }
            }
        }
    }

    async fn handle_submit(
        &self,
        raw: Vec<u8>,
        psbt: bool,
        id: Option<Buf32>,
    ) -> BroadcastTxResponse {
        match self.admit(raw, psbt, id).await {
            Ok((identifier, kind, finalized)) => BroadcastTxResponse {
                success: true,
                transaction_type: Some(format!("{kind:?}")),
                error: None,
                finalized_transaction: finalized,
                identifier: Some(identifier),
            },
            Err(e) => {
                debug!(err = %e, "mempool submission rejected");
                BroadcastTxResponse::rejected(e.to_string())
            }
        }
    }

    /// The admission pipeline, in spec order.
    async fn admit(
        &self,
        raw: Vec<u8>,
        psbt: bool,
        id: Option<Buf32>,
    ) -> MempoolResult<(Buf32, TxKind, bool)> {
        let sync = self.status.sync_status();

        // 1. Overlay consensus must be live at our height.
        if !self.params.overlay().is_active_at(sync.committed_height) {
            return Err(MempoolError::ConsensusNotReached);
        }

        // 2. Optionally refuse while syncing.
        if self.params.run().prevent_broadcast_if_not_synced && !sync.synced {
            return Err(MempoolError::NotSynced);
        }

        // 3. Size cap depends on the submission flavor.
        let limit = if psbt {
            MEMPOOL_MAX_PSBT_SIZE
        } else {
            MEMPOOL_MAX_TX_SIZE
        };
        if raw.len() > limit {
            return Err(MempoolError::TooLarge(raw.len(), limit));
        }

        // 4. Duplicate check on the caller-claimed id.
        if let Some(claimed) = id {
            if self.mempool_ops.has_entry_async(claimed).await? {
                return Err(MempoolError::AlreadyKnown);
            }
        }

        // 5. Version-dispatched verification.
        let verified = verify_submission(&raw, psbt, self.params.overlay())
            .map_err(MempoolError::Verification)?;

        // 6. Forward to the base chain; its txid replaces whatever the
        // caller claimed.  PSBTs stay local until finalized.
        let identifier = if verified.finalized {
            let txid = self
                .client
                .send_raw_transaction(&raw)
                .await
                .map_err(|e| MempoolError::ChainRejected(e.to_string()))?;
            Buf32::from(txid.to_byte_array())
        } else {
            Buf32::from(verified.tx.compute_txid().to_byte_array())
        };

        if self.mempool_ops.has_entry_async(identifier).await? {
            return Err(MempoolError::AlreadyKnown);
        }

        let entry = self.build_entry(identifier, raw, psbt, &verified, sync.committed_height);
        let inputs = entry.inputs.clone();
        self.mempool_ops.put_entry_async(entry).await?;

        // 7. Evict entries this acceptance double-spends, plus their
        // descendant closure.
        let evicted = self.evict_conflicts(identifier, inputs).await?;
        if evicted > 0 {
            debug!(%evicted, "evicted conflicting mempool entries");
        }

        Ok((identifier, verified.kind, verified.finalized))
    }

    fn build_entry(
        &self,
        identifier: Buf32,
        raw: Vec<u8>,
        psbt: bool,
        verified: &VerifiedTx,
        committed_height: u64,
    ) -> MempoolEntry {
        let inputs = verified
            .tx
            .input
            .iter()
            .map(|inp| MempoolInput {
                prev_txid: Buf32::from(inp.previous_output.txid.to_byte_array()),
                prev_vout: inp.previous_output.vout,
            })
            .collect();
        let outputs = verified
            .tx
            .output
            .iter()
            .map(|out| MempoolOutput {
                value: out.value.to_sat(),
                script_pubkey: out.script_pubkey.to_bytes(),
                address: bitcoin::Address::from_script(
                    &out.script_pubkey,
                    self.params.overlay().network,
                )
                .ok()
                .map(|a| a.to_string()),
            })
            .collect();

        let (from, contract_address, calldata, bytecode) = match &verified.parsed {
            Some(parsed) => {
                let calldata = parsed
                    .payload
                    .interaction()
                    .map(|i| i.calldata.clone());
                let bytecode = match &parsed.payload {
                    TxPayload::Deployment(_, d) => Some(d.bytecode.clone()),
                    _ => None,
                };
                (
                    Some(parsed.from.clone()),
                    Some(parsed.contract_address.clone()),
                    calldata,
                    bytecode,
                )
            }
            None => (None, None, None, None),
        };

        let theoretical_gas_limit = calldata
            .as_ref()
            .map(|c| c.len() as u64 * GAS_PER_CALLDATA_BYTE)
            .unwrap_or(0);

        MempoolEntry {
            id: identifier,
            raw,
            psbt,
            block_height: committed_height,
            first_seen: now_millis(),
            kind: verified.kind,
            inputs,
            outputs,
            from,
            contract_address,
            calldata,
            bytecode,
            theoretical_gas_limit,
            priority_fee: compute_burned_value(&verified.tx),
        }
    }

    /// Conflict set plus transitive descendants, visited-set guarded so
    /// spend cycles can't loop us.
    async fn evict_conflicts(
        &self,
        accepted_id: Buf32,
        inputs: Vec<MempoolInput>,
    ) -> MempoolResult<usize> {
        let conflicts = self.mempool_ops.find_conflicting_async(inputs).await?;

        let mut doomed: HashSet<Buf32> = HashSet::new();
        let mut stack: Vec<Buf32> = Vec::new();
        for conflict in conflicts {
            if conflict.id != accepted_id {
                doomed.insert(conflict.id);
                stack.push(conflict.id);
            }
        }

        let mut visited: HashSet<Buf32> = HashSet::new();
        while let Some(txid) = stack.pop() {
            if !visited.insert(txid) {
                continue;
            }
            for descendant in self
                .mempool_ops
                .find_direct_descendants_async(txid)
                .await?
            {
                if descendant.id != accepted_id && doomed.insert(descendant.id) {
                    stack.push(descendant.id);
                }
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }
        Ok(self
            .mempool_ops
            .delete_entries_async(doomed.into_iter().collect())
            .await?)
    }

    /// Confirmed-entry removal and the age purge, driven by block change.
    async fn on_block_committed(&self, height: u64) -> MempoolResult<()> {
        let confirmed: Vec<Buf32> = self
            .tx_ops
            .get_block_txs_async(height)
            .await?
            .iter()
            .map(|tx| *tx.txid())
            .collect();
        if !confirmed.is_empty() {
            let removed = self.mempool_ops.delete_entries_async(confirmed).await?;
            if removed > 0 {
                debug!(%removed, %height, "confirmed entries left the mempool");
            }
        }

        if let Some(cutoff) = height.checked_sub(self.config.expiration_blocks) {
            let purged = self
                .mempool_ops
                .delete_older_than_block_height_async(cutoff)
                .await?;
            if purged > 0 {
                debug!(%purged, %cutoff, "aged entries purged");
            }
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bitcoin::consensus::encode::serialize;
    use bitcoin::Txid;
    use tapnet_btcio::rpc::error::{ClientError, ClientResult};
    use tapnet_btcio::rpc::types::{RpcEstimateSmartFee, RpcMempoolInfo};
    use tapnet_db::traits::NodeDatabase;
    use tapnet_primitives::params::regtest_params;
    use tapnet_rocksdb::test_utils::get_common_db;
    use tapnet_tx_parser::test_utils::{build_overlay_tx, OverlayTxSpec};

    use super::*;

    /// Chain stub: accepts or rejects broadcasts, serves flat fee data.
    struct TestChainClient {
        accept: AtomicBool,
        submissions: Mutex<Vec<Vec<u8>>>,
    }

    impl TestChainClient {
        fn new() -> Self {
            Self {
                accept: AtomicBool::new(true),
                submissions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BroadcasterRpc for TestChainClient {
        async fn send_raw_transaction(&self, raw: &[u8]) -> ClientResult<Txid> {
            if !self.accept.load(Ordering::Relaxed) {
                return Err(ClientError::Server {
                    code: -26,
                    message: "txn-mempool-conflict".to_string(),
                });
            }
            self.submissions.lock().unwrap().push(raw.to_vec());
            let tx: bitcoin::Transaction =
                bitcoin::consensus::encode::deserialize(raw).unwrap();
            Ok(tx.compute_txid())
        }
    }

    #[async_trait]
    impl MempoolRpc for TestChainClient {
        async fn estimate_smart_fee(&self, _t: u16) -> ClientResult<RpcEstimateSmartFee> {
            Ok(RpcEstimateSmartFee {
                feerate: Some(0.0001),
                errors: vec![],
                blocks: 2,
            })
        }

        async fn get_mempool_info(&self) -> ClientResult<RpcMempoolInfo> {
            Ok(RpcMempoolInfo {
                size: 10,
                bytes: 10_000,
                usage: 10_000,
                mempoolminfee: 0.00001,
                minrelaytxfee: 0.00001,
            })
        }
    }

    fn make_worker() -> (MempoolWorker<TestChainClient>, Arc<TestChainClient>) {
        let pool = threadpool::Builder::new().num_threads(2).build();
        let db = get_common_db();
        let mempool_ops = Arc::new(
            tapnet_storage::ops::mempool::Context::new(db.mempool_db().clone())
                .into_ops(pool.clone()),
        );
        let tx_ops = Arc::new(
            tapnet_storage::ops::tx::Context::new(db.tx_db().clone()).into_ops(pool),
        );
        let client = Arc::new(TestChainClient::new());
        let status = StatusChannel::new();
        status.modify_sync_status(|s| {
            s.synced = true;
            s.committed_height = 100;
        });

        let worker = MempoolWorker::new(MempoolContext {
            client: client.clone(),
            mempool_ops,
            tx_ops,
            params: Arc::new(regtest_params()),
            config: MempoolConfig {
                fee_refresh_interval_secs: 60,
                expiration_blocks: 20,
            },
            status,
        });
        (worker, client)
    }

    fn raw_overlay_tx(calldata: Vec<u8>) -> Vec<u8> {
        serialize(&build_overlay_tx(&OverlayTxSpec::interaction(calldata)))
    }

    #[tokio::test]
    async fn test_accept_forwards_and_persists() {
        let (worker, client) = make_worker();
        let raw = raw_overlay_tx(vec![1, 2, 3]);

        let (id, kind, finalized) = worker.admit(raw, false, None).await.unwrap();
        assert_eq!(kind, TxKind::Interaction);
        assert!(finalized);
        assert_eq!(client.submissions.lock().unwrap().len(), 1);
        assert!(worker.mempool_ops.has_entry_async(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_oversize_rejected_before_forwarding() {
        let (worker, client) = make_worker();
        let raw = vec![0x02; MEMPOOL_MAX_TX_SIZE + 1];

        let res = worker.admit(raw, false, None).await;
        assert!(matches!(res, Err(MempoolError::TooLarge(_, _))));
        assert!(client.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_rejection_bubbles_up() {
        let (worker, client) = make_worker();
        client.accept.store(false, Ordering::Relaxed);

        let res = worker.admit(raw_overlay_tx(vec![1]), false, None).await;
        assert!(matches!(res, Err(MempoolError::ChainRejected(_))));
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let (worker, _client) = make_worker();
        let raw = raw_overlay_tx(vec![1, 2, 3]);

        let (id, _, _) = worker.admit(raw.clone(), false, None).await.unwrap();
        let res = worker.admit(raw, false, Some(id)).await;
        assert!(matches!(res, Err(MempoolError::AlreadyKnown)));
    }

    #[tokio::test]
    async fn test_conflict_evicts_descendant_chain() {
        let (worker, _client) = make_worker();

        // Seed entries by hand: B spends (T,0); C spends (B,0).
        let t_outpoint = Buf32::from([0xaa; 32]);
        let b_id = Buf32::from([0xbb; 32]);
        let c_id = Buf32::from([0xcc; 32]);
        worker
            .mempool_ops
            .put_entry_async(entry_with_inputs(b_id, vec![(t_outpoint, 0)]))
            .await
            .unwrap();
        worker
            .mempool_ops
            .put_entry_async(entry_with_inputs(c_id, vec![(b_id, 0)]))
            .await
            .unwrap();

        // A also spends (T,0).
        let a_id = Buf32::from([0xad; 32]);
        let evicted = worker
            .evict_conflicts(
                a_id,
                vec![MempoolInput {
                    prev_txid: t_outpoint,
                    prev_vout: 0,
                }],
            )
            .await
            .unwrap();

        assert_eq!(evicted, 2, "conflict and its descendant both leave");
        assert!(!worker.mempool_ops.has_entry_async(b_id).await.unwrap());
        assert!(!worker.mempool_ops.has_entry_async(c_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_consensus_gate() {
        let (mut worker, _client) = make_worker();
        let mut params = regtest_params();
        params.overlay.activation_height = Some(1_000);
        worker.params = Arc::new(params);

        let res = worker.admit(raw_overlay_tx(vec![1]), false, None).await;
        assert!(matches!(res, Err(MempoolError::ConsensusNotReached)));
    }

    #[tokio::test]
    async fn test_not_synced_gate() {
        let (mut worker, _client) = make_worker();
        let mut params = regtest_params();
        params.run.prevent_broadcast_if_not_synced = true;
        worker.params = Arc::new(params);
        worker.status.modify_sync_status(|s| s.synced = false);

        let res = worker.admit(raw_overlay_tx(vec![1]), false, None).await;
        assert!(matches!(res, Err(MempoolError::NotSynced)));
    }

    fn entry_with_inputs(id: Buf32, inputs: Vec<(Buf32, u32)>) -> MempoolEntry {
        MempoolEntry {
            id,
            raw: vec![],
            psbt: false,
            block_height: 100,
            first_seen: 0,
            kind: TxKind::Generic,
            inputs: inputs
                .into_iter()
                .map(|(prev_txid, prev_vout)| MempoolInput {
                    prev_txid,
                    prev_vout,
                })
                .collect(),
            outputs: vec![],
            from: None,
            contract_address: None,
            calldata: None,
            bytecode: None,
            theoretical_gas_limit: 0,
            priority_fee: 0,
        }
    }
}
