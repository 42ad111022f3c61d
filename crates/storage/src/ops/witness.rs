//! Witness operations.

use tapnet_primitives::buf::Buf64;
use tapnet_primitives::witness::BlockWitness;

use crate::exec::inst_ops;

inst_ops! {
    (WitnessOps, tapnet_db::traits::WitnessDatabase) {
        insert_witness(witness: BlockWitness) => bool;
        set_witness_proofs(block_number: u64, identity: Buf64, proofs: Vec<Vec<u8>>) => ();
        get_witnesses_for_block(block_number: u64) => Vec<BlockWitness>;
        revert_to_height(new_tip: u64) => ();
    }
}
