//! Mempool operations.

use tapnet_db::types::{MempoolEntry, MempoolInput};
use tapnet_primitives::buf::Buf32;

use crate::exec::inst_ops;

inst_ops! {
    (MempoolOps, tapnet_db::traits::MempoolDatabase) {
        put_entry(entry: MempoolEntry) => ();
        get_entry(id: Buf32) => Option<MempoolEntry>;
        has_entry(id: Buf32) => bool;
        delete_entries(ids: Vec<Buf32>) => usize;
        find_conflicting(inputs: Vec<MempoolInput>) => Vec<MempoolEntry>;
        find_direct_descendants(txid: Buf32) => Vec<MempoolEntry>;
        delete_greater_than_block_height(height: u64) => usize;
        delete_older_than_block_height(height: u64) => usize;
    }
}
