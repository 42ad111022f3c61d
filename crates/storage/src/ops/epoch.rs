//! Epoch operations.

use tapnet_primitives::epoch::{EpochRecord, EpochSubmission};

use crate::exec::inst_ops;

inst_ops! {
    (EpochOps, tapnet_db::traits::EpochDatabase) {
        put_epoch(epoch: EpochRecord) => ();
        get_epoch(epoch_number: u64) => Option<EpochRecord>;
        get_last_epoch() => Option<EpochRecord>;
        put_submission(submission: EpochSubmission) => ();
        get_submissions(epoch_number: u64) => Vec<EpochSubmission>;
        revert_to_height(new_tip: u64) => ();
    }
}
