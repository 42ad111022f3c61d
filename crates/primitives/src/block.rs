//! Committed block records and the checksum hash chain over them.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};

use crate::buf::Buf32;
use crate::hash;

/// Describes a committed block and the overlay roots we derived for it.
///
/// Created once on commit; the only mutation we ever perform is deleting
/// whole records during a reorg rollback.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct BlockRecord {
    /// Block height.
    height: u64,

    /// Block hash/ID, what the base chain knows this block as.
    block_hash: Buf32,

    /// Hash of the previous block.
    prev_hash: Buf32,

    /// Merkle root over the block's transaction hashes.
    merkle_root: Buf32,

    /// Root over the overlay transaction receipts.
    receipt_root: Buf32,

    /// Root over the overlay contract storage after execution.
    storage_root: Buf32,

    /// Chained content digest, see [`compute_checksum_root`].
    checksum_root: Buf32,

    /// Ordered proof blobs backing the checksum root.
    checksum_proofs: Vec<Vec<u8>>,

    /// Number of transactions in the block.
    tx_count: u32,

    /// Raw serialized base-chain header.
    raw_header: Vec<u8>,
}

impl BlockRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u64,
        block_hash: Buf32,
        prev_hash: Buf32,
        merkle_root: Buf32,
        receipt_root: Buf32,
        storage_root: Buf32,
        checksum_root: Buf32,
        checksum_proofs: Vec<Vec<u8>>,
        tx_count: u32,
        raw_header: Vec<u8>,
    ) -> Self {
        Self {
            height,
            block_hash,
            prev_hash,
            merkle_root,
            receipt_root,
            storage_root,
            checksum_root,
            checksum_proofs,
            tx_count,
            raw_header,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn block_hash(&self) -> &Buf32 {
        &self.block_hash
    }

    pub fn prev_hash(&self) -> &Buf32 {
        &self.prev_hash
    }

    pub fn merkle_root(&self) -> &Buf32 {
        &self.merkle_root
    }

    pub fn receipt_root(&self) -> &Buf32 {
        &self.receipt_root
    }

    pub fn storage_root(&self) -> &Buf32 {
        &self.storage_root
    }

    pub fn checksum_root(&self) -> &Buf32 {
        &self.checksum_root
    }

    pub fn checksum_proofs(&self) -> &[Vec<u8>] {
        &self.checksum_proofs
    }

    pub fn has_checksum(&self) -> bool {
        !self.checksum_root.is_zero()
    }

    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }

    pub fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    pub fn set_checksum(&mut self, root: Buf32, proofs: Vec<Vec<u8>>) {
        self.checksum_root = root;
        self.checksum_proofs = proofs;
    }
}

/// Computes the per-block content digest chained over the previous block's
/// checksum.  Genesis chains from the zero checksum.
pub fn compute_checksum_root(
    block_hash: &Buf32,
    prev_hash: &Buf32,
    merkle_root: &Buf32,
    receipt_root: &Buf32,
    storage_root: &Buf32,
    prev_checksum: &Buf32,
) -> Buf32 {
    hash::raw_concat(&[
        block_hash.as_slice(),
        prev_hash.as_slice(),
        merkle_root.as_slice(),
        receipt_root.as_slice(),
        storage_root.as_slice(),
        prev_checksum.as_slice(),
    ])
}

/// Digest validators attest to.  Binds the block identity to the checksum
/// chain without exposing the full root preimage.
pub fn compute_witness_digest(
    block_hash: &Buf32,
    prev_hash: &Buf32,
    checksum_root: &Buf32,
    prev_checksum: &Buf32,
) -> Buf32 {
    hash::raw_concat(&[
        block_hash.as_slice(),
        prev_hash.as_slice(),
        checksum_root.as_slice(),
        prev_checksum.as_slice(),
    ])
}

/// A detected base-chain reorganization, inserted once, never mutated.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct ReorgRecord {
    /// First height whose data was discarded.
    pub from_block: u64,

    /// Old committed tip at detection time.
    pub to_block: u64,

    /// Unix millis at detection time.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_chains_on_prev() {
        let bh = Buf32::from([1; 32]);
        let ph = Buf32::from([2; 32]);
        let mr = Buf32::from([3; 32]);
        let rr = Buf32::from([4; 32]);
        let sr = Buf32::from([5; 32]);

        let c1 = compute_checksum_root(&bh, &ph, &mr, &rr, &sr, &Buf32::zero());
        let c2 = compute_checksum_root(&bh, &ph, &mr, &rr, &sr, &c1);
        assert_ne!(c1, c2, "chained digest must depend on prev checksum");
    }

    #[test]
    fn test_witness_digest_differs_from_checksum() {
        let bh = Buf32::from([1; 32]);
        let ph = Buf32::from([2; 32]);
        let cs = Buf32::from([3; 32]);
        let prev = Buf32::zero();
        assert_ne!(
            compute_witness_digest(&bh, &ph, &cs, &prev),
            compute_checksum_root(&bh, &ph, &cs, &cs, &cs, &prev),
        );
    }
}
