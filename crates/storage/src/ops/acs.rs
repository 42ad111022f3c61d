//! Anyone-can-spend output operations.

use tapnet_db::types::AnyoneCanSpendRecord;

use crate::exec::inst_ops;

inst_ops! {
    (AcsOps, tapnet_db::traits::AnyoneCanSpendDatabase) {
        put_outputs(height: u64, outputs: Vec<AnyoneCanSpendRecord>) => ();
        get_outputs(height: u64) => Vec<AnyoneCanSpendRecord>;
        revert_to_height(new_tip: u64) => ();
    }
}
