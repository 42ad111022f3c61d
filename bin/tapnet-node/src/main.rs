use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tapnet_btcio::tip::{tip_channel, tip_poll_task};
use tapnet_btcio::BitcoinClient;
use tapnet_common::logging;
use tapnet_config::Config;
use tapnet_indexer::vm::NoopVm;
use tapnet_indexer::worker::{start_indexer_worker, IndexerContext};
use tapnet_mempool::worker::{start_mempool_worker, MempoolContext};
use tapnet_p2p::session::SessionHandlers;
use tapnet_p2p::worker::{start_p2p_worker, P2pContext};
use tapnet_primitives::constants;
use tapnet_primitives::params::{OverlayParams, Params, RunParams};
use tapnet_rocksdb::{init_core_dbs, open_rocksdb_database, DbOpsConfig, ROCKSDB_NAME};
use tapnet_status::StatusChannel;
use tapnet_storage::create_node_storage;
use tapnet_tasks::TaskManager;
use tapnet_witness::manager::{start_witness_manager, NodeKeys, WitnessConfig};
use tokio::sync::mpsc;
use tracing::*;

use crate::args::Args;

mod args;
mod keys;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");
        return Err(e);
    }
    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(&args)?;
    args.override_config(&mut config);
    let params = Arc::new(resolve_params(&config));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tapnet-rt")
        .build()
        .expect("init: build rt");
    let task_manager = TaskManager::new(runtime.handle().clone());
    let executor = task_manager.executor();

    logging::init(logging::LoggerConfig::with_base_name("tapnet-node"));

    // Thread pool for blocking database jobs.
    let pool = threadpool::Builder::new()
        .thread_name("tapnet-pool".to_owned())
        .num_threads(8)
        .build();

    fs::create_dir_all(&config.client.datadir).context("creating datadir")?;
    let rbdb = open_rocksdb_database(&config.client.datadir, ROCKSDB_NAME)?;
    let ops_config = DbOpsConfig::new(config.client.db_retry_count);
    let database = init_core_dbs(rbdb, ops_config);
    let storage = Arc::new(create_node_storage(database, pool));

    let validator_key = keys::load_validator_keypair(&config.client.datadir)?;
    let p2p_identity = keys::load_p2p_identity(&config.client.datadir)?;

    let bitcoin_client = Arc::new(
        BitcoinClient::new(
            config.bitcoind_rpc.rpc_url.clone(),
            config.bitcoind_rpc.rpc_user.clone(),
            config.bitcoind_rpc.rpc_password.clone(),
        )
        .map_err(|e| anyhow::anyhow!("building bitcoin client: {e}"))?,
    );

    let status_channel = StatusChannel::new();
    info!("init finished, starting main tasks");

    // Chain tip poller feeds the indexer.
    let (tip_tx, tip_rx) = tip_channel();
    executor.spawn_critical_async(
        "chain-tip-poller",
        tip_poll_task(
            bitcoin_client.clone(),
            tip_tx,
            config.sync.client_poll_dur_ms,
            status_channel.clone(),
        ),
    );

    // Indexer worker owns chain progression.
    let indexer_handle = start_indexer_worker(
        &executor,
        IndexerContext {
            client: bitcoin_client.clone(),
            storage: storage.clone(),
            params: params.clone(),
            sync_config: config.sync.clone(),
            ibd_config: config.ibd.clone(),
            vm: Arc::new(NoopVm),
            status: status_channel.clone(),
        },
        tip_rx,
        task_manager.shutdown_signal().subscribe(),
    );

    // Witness manager listens to commits and gossips attestations.
    let (witness_outbound_tx, witness_outbound_rx) = mpsc::channel(256);
    let witness_handle = start_witness_manager(
        &executor,
        storage.witness().clone(),
        storage.block().clone(),
        WitnessConfig {
            pending_block_threshold: config.witness.pending_block_threshold,
            max_pending_witnesses: constants::MAX_PENDING_WITNESSES,
            trusted_keys: params.overlay().trusted_keys.clone(),
            min_trusted_witnesses: params.overlay().min_trusted_witnesses,
            gc_interval: Duration::from_secs(config.witness.gc_interval_secs),
        },
        NodeKeys {
            validator: validator_key,
            trusted: None,
        },
        indexer_handle.subscribe_events(),
        witness_outbound_tx,
        task_manager.shutdown_signal().subscribe(),
    );

    // Mempool worker.
    let mempool_handle = start_mempool_worker(
        &executor,
        MempoolContext {
            client: bitcoin_client.clone(),
            mempool_ops: storage.mempool().clone(),
            tx_ops: storage.tx().clone(),
            params: params.clone(),
            config: config.mempool.clone(),
            status: status_channel.clone(),
        },
        indexer_handle.subscribe_events(),
        task_manager.shutdown_signal().subscribe(),
    );

    // Peer sessions.
    start_p2p_worker(
        &executor,
        P2pContext {
            config: config.p2p.clone(),
            identity: p2p_identity,
            handlers: SessionHandlers {
                witness: witness_handle,
                mempool: mempool_handle,
            },
        },
        witness_outbound_rx,
        task_manager.shutdown_signal().subscribe(),
    );

    task_manager.start_signal_listeners();
    task_manager.monitor(Some(Duration::from_secs(5)))?;

    info!("exiting");
    logging::finalize();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    toml::from_str(&raw).context("parsing config")
}

/// Network parameters.  Fixed per network; regtest gets permissive
/// defaults so local stacks come up without ceremony.
fn resolve_params(config: &Config) -> Params {
    let network = config.bitcoind_rpc.network;
    Params {
        overlay: OverlayParams {
            network,
            activation_height: None,
            start_indexing_utxos_at: 0,
            blocks_per_epoch: constants::BLOCKS_PER_EPOCH,
            max_calldata_size: constants::MAX_CALLDATA_SIZE_DECOMPRESSED,
            trusted_keys: Vec::new(),
            min_trusted_witnesses: 1,
        },
        run: RunParams {
            max_prefetch_blocks: config.sync.max_prefetch_blocks,
            max_reorg_depth: config.sync.max_reorg_depth,
            prevent_broadcast_if_not_synced: config.sync.prevent_broadcast_if_not_synced,
            pending_block_threshold: config.witness.pending_block_threshold,
        },
    }
}
