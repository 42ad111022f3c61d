use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::traits::AnyoneCanSpendDatabase;
use tapnet_db::types::AnyoneCanSpendRecord;
use tapnet_db::DbResult;

use crate::macros::define_table_with_seek_key_codec;
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// Tracked anyone-can-spend outputs per block.
    (AnyoneCanSpendSchema) u64 => Vec<AnyoneCanSpendRecord>
);

pub struct AcsDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl AcsDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl AnyoneCanSpendDatabase for AcsDb {
    fn put_outputs(&self, height: u64, outputs: Vec<AnyoneCanSpendRecord>) -> DbResult<()> {
        self.db.put::<AnyoneCanSpendSchema>(&height, &outputs)?;
        Ok(())
    }

    fn get_outputs(&self, height: u64) -> DbResult<Vec<AnyoneCanSpendRecord>> {
        Ok(self
            .db
            .get::<AnyoneCanSpendSchema>(&height)?
            .unwrap_or_default())
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        let Some((tip, _)) = rockbound::utils::get_last::<AnyoneCanSpendSchema>(&*self.db)? else {
            return Ok(());
        };
        if tip <= new_tip {
            return Ok(());
        }
        let mut batch = SchemaBatch::new();
        for height in (new_tip + 1)..=tip {
            batch.delete::<AnyoneCanSpendSchema>(&height)?;
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}
