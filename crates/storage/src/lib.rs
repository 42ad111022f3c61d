//! Storage operation interfaces over the raw database traits.
//!
//! All database work runs on a shared thread pool; every operation comes in
//! `_blocking` and `_async` flavors.  The pool is also the serialization
//! point the destructive paths drain before deleting anything.

pub mod exec;
pub mod ops;

use std::sync::Arc;

use tapnet_db::traits::NodeDatabase;

pub use ops::acs::AcsOps;
pub use ops::block::BlockDataOps;
pub use ops::checkpoint::CheckpointOps;
pub use ops::epoch::EpochOps;
pub use ops::mempool::MempoolOps;
pub use ops::pubkey::PublicKeyOps;
pub use ops::reorg::ReorgOps;
pub use ops::tx::TxDataOps;
pub use ops::witness::WitnessOps;

/// Bundle of all collection ops, what workers actually hold.
pub struct NodeStorage {
    pool: threadpool::ThreadPool,
    block_ops: Arc<BlockDataOps>,
    tx_ops: Arc<TxDataOps>,
    witness_ops: Arc<WitnessOps>,
    epoch_ops: Arc<EpochOps>,
    mempool_ops: Arc<MempoolOps>,
    checkpoint_ops: Arc<CheckpointOps>,
    reorg_ops: Arc<ReorgOps>,
    pubkey_ops: Arc<PublicKeyOps>,
    acs_ops: Arc<AcsOps>,
}

impl NodeStorage {
    pub fn block(&self) -> &Arc<BlockDataOps> {
        &self.block_ops
    }

    pub fn tx(&self) -> &Arc<TxDataOps> {
        &self.tx_ops
    }

    pub fn witness(&self) -> &Arc<WitnessOps> {
        &self.witness_ops
    }

    pub fn epoch(&self) -> &Arc<EpochOps> {
        &self.epoch_ops
    }

    pub fn mempool(&self) -> &Arc<MempoolOps> {
        &self.mempool_ops
    }

    pub fn checkpoint(&self) -> &Arc<CheckpointOps> {
        &self.checkpoint_ops
    }

    pub fn reorg(&self) -> &Arc<ReorgOps> {
        &self.reorg_ops
    }

    pub fn pubkey(&self) -> &Arc<PublicKeyOps> {
        &self.pubkey_ops
    }

    pub fn acs(&self) -> &Arc<AcsOps> {
        &self.acs_ops
    }

    /// Blocks until every queued database job has finished.  Called before
    /// destructive operations so no write lands after the delete.
    pub fn drain_pending_writes(&self) {
        self.pool.join();
    }
}

/// Wires the ops layer over a database bundle.
pub fn create_node_storage<D>(db: Arc<D>, pool: threadpool::ThreadPool) -> NodeStorage
where
    D: NodeDatabase + Sync + Send + 'static,
{
    NodeStorage {
        block_ops: Arc::new(
            ops::block::Context::new(db.block_db().clone()).into_ops(pool.clone()),
        ),
        tx_ops: Arc::new(ops::tx::Context::new(db.tx_db().clone()).into_ops(pool.clone())),
        witness_ops: Arc::new(
            ops::witness::Context::new(db.witness_db().clone()).into_ops(pool.clone()),
        ),
        epoch_ops: Arc::new(
            ops::epoch::Context::new(db.epoch_db().clone()).into_ops(pool.clone()),
        ),
        mempool_ops: Arc::new(
            ops::mempool::Context::new(db.mempool_db().clone()).into_ops(pool.clone()),
        ),
        checkpoint_ops: Arc::new(
            ops::checkpoint::Context::new(db.checkpoint_db().clone()).into_ops(pool.clone()),
        ),
        reorg_ops: Arc::new(
            ops::reorg::Context::new(db.reorg_db().clone()).into_ops(pool.clone()),
        ),
        pubkey_ops: Arc::new(
            ops::pubkey::Context::new(db.pubkey_db().clone()).into_ops(pool.clone()),
        ),
        acs_ops: Arc::new(ops::acs::Context::new(db.acs_db().clone()).into_ops(pool.clone())),
        pool,
    }
}
