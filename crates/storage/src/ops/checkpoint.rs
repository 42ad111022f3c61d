//! Bulk import checkpoint operations.

use tapnet_db::types::IbdCheckpoint;

use crate::exec::inst_ops;

inst_ops! {
    (CheckpointOps, tapnet_db::traits::CheckpointDatabase) {
        put_checkpoint(checkpoint: IbdCheckpoint) => ();
        get_checkpoint() => Option<IbdCheckpoint>;
        clear_checkpoint() => ();
    }
}
