//! Epoch lifecycle driven by block commits.
//!
//! The epoch containing block B satisfies `start ≤ B ≤ end`.  An epoch
//! record is created when its first block commits and finalized when its
//! last block commits; finalization picks the highest-difficulty submission
//! as proposer.

use std::sync::Arc;

use tapnet_db::types::MldsaKeyEntry;
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::constants::EPOCH_ACTIVE_SENTINEL;
use tapnet_primitives::epoch::{epoch_of_block, epoch_range, EpochRecord};
use tapnet_primitives::hash;
use tapnet_storage::{EpochOps, PublicKeyOps};
use tracing::*;

use crate::errors::IndexerResult;

pub struct EpochTracker {
    ops: Arc<EpochOps>,
    pubkey_ops: Option<Arc<PublicKeyOps>>,
    blocks_per_epoch: u64,
}

impl EpochTracker {
    pub fn new(ops: Arc<EpochOps>, blocks_per_epoch: u64) -> Self {
        Self {
            ops,
            pubkey_ops: None,
            blocks_per_epoch,
        }
    }

    /// Registers the key registry so finalized proposers land in it.
    pub fn with_pubkey_registry(mut self, pubkey_ops: Arc<PublicKeyOps>) -> Self {
        self.pubkey_ops = Some(pubkey_ops);
        self
    }

    /// Reflects a freshly committed block in the epoch table.
    pub async fn on_block_committed(
        &self,
        height: u64,
        checksum_root: Buf32,
    ) -> IndexerResult<()> {
        let number = epoch_of_block(height, self.blocks_per_epoch);
        let (start, end) = epoch_range(number, self.blocks_per_epoch);

        if height == start {
            self.open_epoch(number, start).await?;
        }
        if height == end {
            self.finalize_epoch(number, checksum_root).await?;
        }
        Ok(())
    }

    async fn open_epoch(&self, number: u64, start: u64) -> IndexerResult<()> {
        if self.ops.get_epoch_async(number).await?.is_some() {
            // Re-commit of the first block after a restart; nothing to do.
            return Ok(());
        }

        let prev_hash = match number.checked_sub(1) {
            Some(prev) => self
                .ops
                .get_epoch_async(prev)
                .await?
                .map(|e| e.epoch_hash)
                .unwrap_or_default(),
            None => Buf32::zero(),
        };

        let record = EpochRecord {
            epoch_number: number,
            start_block: start,
            end_block: EPOCH_ACTIVE_SENTINEL,
            proposer: None,
            difficulty_scaled: 0,
            epoch_hash: Buf32::zero(),
            epoch_root: Buf32::zero(),
            // Mining target for this epoch binds to the previous epoch hash.
            target_hash: hash::raw(prev_hash.as_slice()),
            proofs: Vec::new(),
        };
        debug!(epoch = %number, %start, "opened epoch");
        self.ops.put_epoch_async(record).await?;
        Ok(())
    }

    async fn finalize_epoch(&self, number: u64, checksum_root: Buf32) -> IndexerResult<()> {
        let (start, end) = epoch_range(number, self.blocks_per_epoch);
        let mut record = match self.ops.get_epoch_async(number).await? {
            Some(r) => r,
            None => {
                // First block of the epoch was committed before this node
                // tracked epochs (bulk import path); synthesize it now.
                EpochRecord {
                    epoch_number: number,
                    start_block: start,
                    end_block: EPOCH_ACTIVE_SENTINEL,
                    proposer: None,
                    difficulty_scaled: 0,
                    epoch_hash: Buf32::zero(),
                    epoch_root: Buf32::zero(),
                    target_hash: Buf32::zero(),
                    proofs: Vec::new(),
                }
            }
        };

        // Winner is the best-difficulty submission, if anyone proposed.
        let submissions = self.ops.get_submissions_async(number).await?;
        if let Some(winner) = submissions
            .into_iter()
            .max_by_key(|s| (s.difficulty_scaled, std::cmp::Reverse(s.received_at)))
        {
            if let Some(pubkey_ops) = &self.pubkey_ops {
                pubkey_ops
                    .put_key_async(MldsaKeyEntry {
                        key_hash: hash::raw(&winner.proposer.mldsa_public_key),
                        public_key: winner.proposer.mldsa_public_key.clone(),
                        block_height: end,
                    })
                    .await?;
            }
            record.difficulty_scaled = winner.difficulty_scaled;
            record.proposer = Some(winner.proposer);
        }

        record.end_block = end;
        record.epoch_root = checksum_root;
        record.epoch_hash = hash::compute_borsh_hash(&(
            record.epoch_number,
            record.start_block,
            record.end_block,
            record.epoch_root,
            record.target_hash,
            record.difficulty_scaled,
        ));

        info!(epoch = %number, %end, "finalized epoch");
        self.ops.put_epoch_async(record).await?;
        Ok(())
    }

    /// Epoch number whose preimage is served to API consumers: two behind
    /// the epoch of the committed tip, clamped at zero.  A node that has
    /// just crossed boundary K serves K−2 during the grace window.
    pub fn servable_epoch(&self, committed_height: u64) -> u64 {
        epoch_of_block(committed_height, self.blocks_per_epoch).saturating_sub(2)
    }
}

#[cfg(test)]
mod tests {
    use tapnet_db::traits::NodeDatabase;
    use tapnet_primitives::epoch::EpochSubmission;
    use tapnet_primitives::test_utils::ArbitraryGenerator;
    use tapnet_rocksdb::test_utils::get_common_db;
    use tapnet_storage::ops::epoch::Context;

    use super::*;

    fn tracker() -> EpochTracker {
        let pool = threadpool::Builder::new().num_threads(2).build();
        let db = get_common_db();
        let ops = Arc::new(Context::new(db.epoch_db().clone()).into_ops(pool));
        EpochTracker::new(ops, 5)
    }

    #[tokio::test]
    async fn test_epoch_opens_and_finalizes() {
        let tracker = tracker();

        tracker
            .on_block_committed(0, Buf32::from([1; 32]))
            .await
            .unwrap();
        let open = tracker.ops.get_epoch_async(0).await.unwrap().unwrap();
        assert!(open.is_active());

        for h in 1..=4u64 {
            tracker
                .on_block_committed(h, Buf32::from([h as u8; 32]))
                .await
                .unwrap();
        }
        let closed = tracker.ops.get_epoch_async(0).await.unwrap().unwrap();
        assert!(!closed.is_active());
        assert_eq!(closed.end_block, 4);
        assert_eq!(closed.epoch_root, Buf32::from([4; 32]));
        assert!(closed.contains_block(2));
    }

    #[tokio::test]
    async fn test_finalize_picks_best_submission() {
        let tracker = tracker();
        let gen = ArbitraryGenerator::new();

        for (i, difficulty) in [(1u8, 10u64), (2, 99), (3, 50)] {
            let mut sub: EpochSubmission = gen.generate();
            sub.epoch_number = 0;
            sub.submission_hash = Buf32::from([i; 32]);
            sub.difficulty_scaled = difficulty;
            tracker.ops.put_submission_async(sub).await.unwrap();
        }

        for h in 0..=4u64 {
            tracker
                .on_block_committed(h, Buf32::from([7; 32]))
                .await
                .unwrap();
        }

        let closed = tracker.ops.get_epoch_async(0).await.unwrap().unwrap();
        assert_eq!(closed.difficulty_scaled, 99, "highest difficulty wins");
        assert!(closed.proposer.is_some());
    }

    #[tokio::test]
    async fn test_servable_epoch_is_two_behind() {
        let tracker = tracker();
        assert_eq!(tracker.servable_epoch(4), 0, "clamped at zero");
        assert_eq!(tracker.servable_epoch(10), 0);
        assert_eq!(tracker.servable_epoch(15), 1);
        assert_eq!(tracker.servable_epoch(25), 3);
    }
}
