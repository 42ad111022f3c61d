//! Aggregation of the per-collection database handles.

use std::sync::Arc;

use crate::traits::*;

/// Database handle bundle backed by one concrete implementation per
/// collection.  Tests swap individual members for stubs.
#[allow(clippy::type_complexity)]
pub struct CommonDatabase<B, T, W, E, M, C, R, P, A>
where
    B: BlockDatabase + Send + Sync + 'static,
    T: TransactionDatabase + Send + Sync + 'static,
    W: WitnessDatabase + Send + Sync + 'static,
    E: EpochDatabase + Send + Sync + 'static,
    M: MempoolDatabase + Send + Sync + 'static,
    C: CheckpointDatabase + Send + Sync + 'static,
    R: ReorgDatabase + Send + Sync + 'static,
    P: PublicKeyDatabase + Send + Sync + 'static,
    A: AnyoneCanSpendDatabase + Send + Sync + 'static,
{
    block_db: Arc<B>,
    tx_db: Arc<T>,
    witness_db: Arc<W>,
    epoch_db: Arc<E>,
    mempool_db: Arc<M>,
    checkpoint_db: Arc<C>,
    reorg_db: Arc<R>,
    pubkey_db: Arc<P>,
    acs_db: Arc<A>,
}

impl<B, T, W, E, M, C, R, P, A> CommonDatabase<B, T, W, E, M, C, R, P, A>
where
    B: BlockDatabase + Send + Sync + 'static,
    T: TransactionDatabase + Send + Sync + 'static,
    W: WitnessDatabase + Send + Sync + 'static,
    E: EpochDatabase + Send + Sync + 'static,
    M: MempoolDatabase + Send + Sync + 'static,
    C: CheckpointDatabase + Send + Sync + 'static,
    R: ReorgDatabase + Send + Sync + 'static,
    P: PublicKeyDatabase + Send + Sync + 'static,
    A: AnyoneCanSpendDatabase + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        block_db: Arc<B>,
        tx_db: Arc<T>,
        witness_db: Arc<W>,
        epoch_db: Arc<E>,
        mempool_db: Arc<M>,
        checkpoint_db: Arc<C>,
        reorg_db: Arc<R>,
        pubkey_db: Arc<P>,
        acs_db: Arc<A>,
    ) -> Self {
        Self {
            block_db,
            tx_db,
            witness_db,
            epoch_db,
            mempool_db,
            checkpoint_db,
            reorg_db,
            pubkey_db,
            acs_db,
        }
    }
}

impl<B, T, W, E, M, C, R, P, A> NodeDatabase for CommonDatabase<B, T, W, E, M, C, R, P, A>
where
    B: BlockDatabase + Send + Sync + 'static,
    T: TransactionDatabase + Send + Sync + 'static,
    W: WitnessDatabase + Send + Sync + 'static,
    E: EpochDatabase + Send + Sync + 'static,
    M: MempoolDatabase + Send + Sync + 'static,
    C: CheckpointDatabase + Send + Sync + 'static,
    R: ReorgDatabase + Send + Sync + 'static,
    P: PublicKeyDatabase + Send + Sync + 'static,
    A: AnyoneCanSpendDatabase + Send + Sync + 'static,
{
    type BlockDb = B;
    type TxDb = T;
    type WitnessDb = W;
    type EpochDb = E;
    type MempoolDb = M;
    type CheckpointDb = C;
    type ReorgDb = R;
    type PublicKeyDb = P;
    type AcsDb = A;

    fn block_db(&self) -> &Arc<B> {
        &self.block_db
    }

    fn tx_db(&self) -> &Arc<T> {
        &self.tx_db
    }

    fn witness_db(&self) -> &Arc<W> {
        &self.witness_db
    }

    fn epoch_db(&self) -> &Arc<E> {
        &self.epoch_db
    }

    fn mempool_db(&self) -> &Arc<M> {
        &self.mempool_db
    }

    fn checkpoint_db(&self) -> &Arc<C> {
        &self.checkpoint_db
    }

    fn reorg_db(&self) -> &Arc<R> {
        &self.reorg_db
    }

    fn pubkey_db(&self) -> &Arc<P> {
        &self.pubkey_db
    }

    fn acs_db(&self) -> &Arc<A> {
        &self.acs_db
    }
}
