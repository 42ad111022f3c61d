use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaDBOperationsExt};
use tapnet_db::traits::ReorgDatabase;
use tapnet_db::DbResult;
use tapnet_primitives::block::ReorgRecord;

use crate::macros::define_table_with_seek_key_codec;
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// Append-only reorg markers keyed by sequence number.
    (ReorgSchema) u64 => ReorgRecord
);

pub struct ReorgDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl ReorgDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl ReorgDatabase for ReorgDb {
    fn put_reorg(&self, reorg: ReorgRecord) -> DbResult<u64> {
        let next_seq = rockbound::utils::get_last::<ReorgSchema>(&*self.db)?
            .map(|(seq, _)| seq + 1)
            .unwrap_or(0);
        self.db.put::<ReorgSchema>(&next_seq, &reorg)?;
        Ok(next_seq)
    }

    fn get_last_reorg(&self) -> DbResult<Option<ReorgRecord>> {
        Ok(rockbound::utils::get_last::<ReorgSchema>(&*self.db)?.map(|(_, r)| r))
    }

    fn get_reorg(&self, seq: u64) -> DbResult<Option<ReorgRecord>> {
        Ok(self.db.get::<ReorgSchema>(&seq)?)
    }
}
