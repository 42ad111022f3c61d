use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaDBOperationsExt};
use tapnet_db::traits::CheckpointDatabase;
use tapnet_db::types::IbdCheckpoint;
use tapnet_db::DbResult;

use crate::macros::define_table_with_default_codec;
use crate::DbOpsConfig;

define_table_with_default_codec!(
    /// Single-row bulk import checkpoint.
    (IbdCheckpointSchema) u8 => IbdCheckpoint
);

const CHECKPOINT_KEY: u8 = 0;

pub struct CheckpointDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl CheckpointDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl CheckpointDatabase for CheckpointDb {
    fn put_checkpoint(&self, checkpoint: IbdCheckpoint) -> DbResult<()> {
        self.db
            .put::<IbdCheckpointSchema>(&CHECKPOINT_KEY, &checkpoint)?;
        Ok(())
    }

    fn get_checkpoint(&self) -> DbResult<Option<IbdCheckpoint>> {
        Ok(self.db.get::<IbdCheckpointSchema>(&CHECKPOINT_KEY)?)
    }

    fn clear_checkpoint(&self) -> DbResult<()> {
        self.db.delete::<IbdCheckpointSchema>(&CHECKPOINT_KEY)?;
        Ok(())
    }
}
