use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::traits::PublicKeyDatabase;
use tapnet_db::types::MldsaKeyEntry;
use tapnet_db::DbResult;
use tapnet_primitives::buf::Buf32;

use crate::macros::define_table_with_default_codec;
use crate::DbOpsConfig;

define_table_with_default_codec!(
    /// Post-quantum key registry keyed by key hash.
    (MldsaKeySchema) Buf32 => MldsaKeyEntry
);

pub struct PublicKeyDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl PublicKeyDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl PublicKeyDatabase for PublicKeyDb {
    fn put_key(&self, entry: MldsaKeyEntry) -> DbResult<()> {
        self.db.put::<MldsaKeySchema>(&entry.key_hash, &entry)?;
        Ok(())
    }

    fn get_key(&self, key_hash: Buf32) -> DbResult<Option<MldsaKeyEntry>> {
        Ok(self.db.get::<MldsaKeySchema>(&key_hash)?)
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        // Registry is small; scan and drop rows inserted above the fork.
        let mut batch = SchemaBatch::new();
        let mut iterator = self.db.iter::<MldsaKeySchema>()?;
        iterator.seek_to_first();
        for res in iterator {
            let (key_hash, entry) = res?.into_tuple();
            if entry.block_height > new_tip {
                batch.delete::<MldsaKeySchema>(&key_hash)?;
            }
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;

    fn gen_key(seed: u8, height: u64) -> MldsaKeyEntry {
        MldsaKeyEntry {
            key_hash: Buf32::from([seed; 32]),
            public_key: vec![seed; 48],
            block_height: height,
        }
    }

    #[test]
    fn test_revert_deletes_by_height() {
        let (db, db_ops) = get_rocksdb_tmp_instance().unwrap();
        let db = PublicKeyDb::new(db, db_ops);

        db.put_key(gen_key(1, 10)).unwrap();
        db.put_key(gen_key(2, 20)).unwrap();

        db.revert_to_height(15).unwrap();

        assert!(db.get_key(Buf32::from([1; 32])).unwrap().is_some());
        assert!(db.get_key(Buf32::from([2; 32])).unwrap().is_none());
    }
}
