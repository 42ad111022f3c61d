//! Reorg marker operations.

use tapnet_primitives::block::ReorgRecord;

use crate::exec::inst_ops;

inst_ops! {
    (ReorgOps, tapnet_db::traits::ReorgDatabase) {
        put_reorg(reorg: ReorgRecord) => u64;
        get_last_reorg() => Option<ReorgRecord>;
        get_reorg(seq: u64) => Option<ReorgRecord>;
    }
}
