//! Epoch records.  An epoch batches a fixed-length block range for proposer
//! selection and proof submission.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};

use crate::buf::{Buf32, Buf64};
use crate::constants::EPOCH_ACTIVE_SENTINEL;

/// Proposer-submitted solution record.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct ProposerRecord {
    /// Post-quantum public key the solution is bound to.
    pub mldsa_public_key: Vec<u8>,

    /// Legacy schnorr key, kept for the transition period.
    pub legacy_public_key: Buf32,

    /// Mining solution over the epoch target.
    pub solution: Vec<u8>,

    /// Salt the solution was derived with.
    pub salt: Buf32,

    /// Optional free-form graffiti, capped by consensus upstream.
    pub graffiti: Option<Vec<u8>>,

    /// Signature over the submission.
    pub signature: Buf64,
}

/// One epoch.  Created on the first block of its range, finalized when the
/// last block is committed.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct EpochRecord {
    pub epoch_number: u64,
    pub start_block: u64,

    /// Last block of the range, or [`EPOCH_ACTIVE_SENTINEL`] while active.
    pub end_block: u64,

    pub proposer: Option<ProposerRecord>,

    /// Scaled difficulty of the winning solution.
    pub difficulty_scaled: u64,

    pub epoch_hash: Buf32,
    pub epoch_root: Buf32,
    pub target_hash: Buf32,
    pub proofs: Vec<Vec<u8>>,
}

impl EpochRecord {
    pub fn is_active(&self) -> bool {
        self.end_block == EPOCH_ACTIVE_SENTINEL
    }

    /// Whether the given block height falls inside this epoch's range.
    pub fn contains_block(&self, height: u64) -> bool {
        self.start_block <= height && height <= self.end_block
    }
}

/// A proposer submission competing for an epoch, kept until the epoch
/// finalizes and a winner is picked by difficulty.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct EpochSubmission {
    pub epoch_number: u64,
    pub submission_hash: Buf32,
    pub proposer: ProposerRecord,
    pub difficulty_scaled: u64,
    pub received_at: u64,
}

/// Epoch number the given height belongs to.
pub fn epoch_of_block(height: u64, blocks_per_epoch: u64) -> u64 {
    height / blocks_per_epoch
}

/// Block range covered by the given epoch.
pub fn epoch_range(epoch: u64, blocks_per_epoch: u64) -> (u64, u64) {
    let start = epoch * blocks_per_epoch;
    (start, start + blocks_per_epoch - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_range_contains() {
        let (start, end) = epoch_range(3, 5);
        assert_eq!((start, end), (15, 19));
        for h in start..=end {
            assert_eq!(epoch_of_block(h, 5), 3);
        }
        assert_eq!(epoch_of_block(start - 1, 5), 2);
        assert_eq!(epoch_of_block(end + 1, 5), 4);
    }
}
