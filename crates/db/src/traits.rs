//! Trait definitions for low level database interfaces.
//!
//! Write ownership is per-collection: the indexer owns blocks, transactions,
//! epochs, pubkeys and anyone-can-spend rows; the witness manager owns the
//! witness rows; the mempool worker owns the mempool rows.  Everyone else
//! reads.

use tapnet_primitives::block::{BlockRecord, ReorgRecord};
use tapnet_primitives::buf::{Buf32, Buf64};
use tapnet_primitives::epoch::{EpochRecord, EpochSubmission};
use tapnet_primitives::tx::TransactionRecord;
use tapnet_primitives::witness::BlockWitness;

use crate::types::{
    AnyoneCanSpendRecord, IbdCheckpoint, MempoolEntry, MempoolInput, MldsaKeyEntry,
};
use crate::DbResult;

/// Block records and the chain tip cursor.
pub trait BlockDatabase {
    /// Atomically extends the chain with a new block.  Errors if provided
    /// out-of-order (next height must be tip + 1, or anything if empty).
    fn put_block(&self, block: BlockRecord) -> DbResult<()>;

    /// Writes only header-derived fields for a height, idempotently.  Used
    /// by the bulk import, which does not advance in strict tip order.
    fn put_header(&self, block: BlockRecord) -> DbResult<()>;

    /// Sets the checksum fields of an already-stored block.
    fn set_block_checksum(&self, height: u64, root: Buf32, proofs: Vec<Vec<u8>>) -> DbResult<()>;

    /// Resets the chain so `new_tip` is the highest stored block, deleting
    /// everything above it.
    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;

    /// Highest stored block height, if any.
    fn get_chain_tip(&self) -> DbResult<Option<u64>>;

    fn get_block_at(&self, height: u64) -> DbResult<Option<BlockRecord>>;

    /// Returns the blocks in the half-open range, in height order, skipping
    /// holes.
    fn get_block_range(&self, start: u64, end: u64) -> DbResult<Vec<BlockRecord>>;
}

/// Overlay transactions per block.
pub trait TransactionDatabase {
    /// Stores all transactions of one block.  Replaces any previous set for
    /// the height.
    fn put_block_txs(&self, height: u64, txs: Vec<TransactionRecord>) -> DbResult<()>;

    fn get_block_txs(&self, height: u64) -> DbResult<Vec<TransactionRecord>>;

    fn get_tx_by_id(&self, txid: Buf32) -> DbResult<Option<TransactionRecord>>;

    /// Deletes transactions of all blocks above `new_tip`.
    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;
}

/// Block attestations, unique by `(block_number, identity)`.
pub trait WitnessDatabase {
    /// Inserts a witness if that `(block, identity)` slot is empty.  Returns
    /// whether the row was inserted.
    fn insert_witness(&self, witness: BlockWitness) -> DbResult<bool>;

    /// Back-fills proofs on an existing witness row.
    fn set_witness_proofs(
        &self,
        block_number: u64,
        identity: Buf64,
        proofs: Vec<Vec<u8>>,
    ) -> DbResult<()>;

    fn get_witnesses_for_block(&self, block_number: u64) -> DbResult<Vec<BlockWitness>>;

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;
}

/// Epoch documents and proposer submissions.
pub trait EpochDatabase {
    fn put_epoch(&self, epoch: EpochRecord) -> DbResult<()>;

    fn get_epoch(&self, epoch_number: u64) -> DbResult<Option<EpochRecord>>;

    fn get_last_epoch(&self) -> DbResult<Option<EpochRecord>>;

    fn put_submission(&self, submission: EpochSubmission) -> DbResult<()>;

    fn get_submissions(&self, epoch_number: u64) -> DbResult<Vec<EpochSubmission>>;

    /// Deletes epochs whose range starts above `new_tip` and their
    /// submissions.
    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;
}

/// The mempool row set.
pub trait MempoolDatabase {
    /// Inserts or replaces the entry keyed by its id.
    fn put_entry(&self, entry: MempoolEntry) -> DbResult<()>;

    fn get_entry(&self, id: Buf32) -> DbResult<Option<MempoolEntry>>;

    fn has_entry(&self, id: Buf32) -> DbResult<bool>;

    /// Deletes the given ids, returning how many rows actually existed.
    fn delete_entries(&self, ids: Vec<Buf32>) -> DbResult<usize>;

    /// Entries whose inputs intersect the given outpoint set.
    fn find_conflicting(&self, inputs: Vec<MempoolInput>) -> DbResult<Vec<MempoolEntry>>;

    /// Entries spending any output of the given txid.
    fn find_direct_descendants(&self, txid: Buf32) -> DbResult<Vec<MempoolEntry>>;

    /// Deletes entries first seen above the given height.  `0` wipes the
    /// collection.
    fn delete_greater_than_block_height(&self, height: u64) -> DbResult<usize>;

    /// Deletes entries first seen at or below the given height.
    fn delete_older_than_block_height(&self, height: u64) -> DbResult<usize>;
}

/// The single bulk-import checkpoint row.
pub trait CheckpointDatabase {
    fn put_checkpoint(&self, checkpoint: IbdCheckpoint) -> DbResult<()>;

    fn get_checkpoint(&self) -> DbResult<Option<IbdCheckpoint>>;

    fn clear_checkpoint(&self) -> DbResult<()>;
}

/// Reorg markers, append-only.
pub trait ReorgDatabase {
    fn put_reorg(&self, reorg: ReorgRecord) -> DbResult<u64>;

    fn get_last_reorg(&self) -> DbResult<Option<ReorgRecord>>;

    fn get_reorg(&self, seq: u64) -> DbResult<Option<ReorgRecord>>;
}

/// Post-quantum key registry.
pub trait PublicKeyDatabase {
    fn put_key(&self, entry: MldsaKeyEntry) -> DbResult<()>;

    fn get_key(&self, key_hash: Buf32) -> DbResult<Option<MldsaKeyEntry>>;

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;
}

/// Anyone-can-spend outputs tracked per block.
pub trait AnyoneCanSpendDatabase {
    fn put_outputs(&self, height: u64, outputs: Vec<AnyoneCanSpendRecord>) -> DbResult<()>;

    fn get_outputs(&self, height: u64) -> DbResult<Vec<AnyoneCanSpendRecord>>;

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()>;
}

/// Common database interface that we can parameterize worker tasks over.
pub trait NodeDatabase {
    type BlockDb: BlockDatabase + Send + Sync + 'static;
    type TxDb: TransactionDatabase + Send + Sync + 'static;
    type WitnessDb: WitnessDatabase + Send + Sync + 'static;
    type EpochDb: EpochDatabase + Send + Sync + 'static;
    type MempoolDb: MempoolDatabase + Send + Sync + 'static;
    type CheckpointDb: CheckpointDatabase + Send + Sync + 'static;
    type ReorgDb: ReorgDatabase + Send + Sync + 'static;
    type PublicKeyDb: PublicKeyDatabase + Send + Sync + 'static;
    type AcsDb: AnyoneCanSpendDatabase + Send + Sync + 'static;

    fn block_db(&self) -> &std::sync::Arc<Self::BlockDb>;
    fn tx_db(&self) -> &std::sync::Arc<Self::TxDb>;
    fn witness_db(&self) -> &std::sync::Arc<Self::WitnessDb>;
    fn epoch_db(&self) -> &std::sync::Arc<Self::EpochDb>;
    fn mempool_db(&self) -> &std::sync::Arc<Self::MempoolDb>;
    fn checkpoint_db(&self) -> &std::sync::Arc<Self::CheckpointDb>;
    fn reorg_db(&self) -> &std::sync::Arc<Self::ReorgDb>;
    fn pubkey_db(&self) -> &std::sync::Arc<Self::PublicKeyDb>;
    fn acs_db(&self) -> &std::sync::Arc<Self::AcsDb>;
}
