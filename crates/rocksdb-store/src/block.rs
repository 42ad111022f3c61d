use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::errors::DbError;
use tapnet_db::traits::BlockDatabase;
use tapnet_db::DbResult;
use tapnet_primitives::block::BlockRecord;
use tapnet_primitives::buf::Buf32;

use crate::macros::define_table_with_seek_key_codec;
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// Committed block records keyed by height.
    (BlockSchema) u64 => BlockRecord
);

pub struct BlockDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl BlockDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }

    fn last_entry(&self) -> DbResult<Option<(u64, BlockRecord)>> {
        Ok(rockbound::utils::get_last::<BlockSchema>(&*self.db)?)
    }
}

impl BlockDatabase for BlockDb {
    fn put_block(&self, block: BlockRecord) -> DbResult<()> {
        let height = block.height();
        if let Some((tip, _)) = self.last_entry()? {
            if height != tip + 1 {
                return Err(DbError::OooInsert("block_entry", height));
            }
        }
        self.db.put::<BlockSchema>(&height, &block)?;
        Ok(())
    }

    fn put_header(&self, block: BlockRecord) -> DbResult<()> {
        // Bulk import writes headers out of tip order, and re-running a
        // phase overwrites with identical content.
        self.db.put::<BlockSchema>(&block.height(), &block)?;
        Ok(())
    }

    fn set_block_checksum(&self, height: u64, root: Buf32, proofs: Vec<Vec<u8>>) -> DbResult<()> {
        let mut block = self
            .db
            .get::<BlockSchema>(&height)?
            .ok_or(DbError::MissingEntry("block_entry", height))?;
        block.set_checksum(root, proofs);
        self.db.put::<BlockSchema>(&height, &block)?;
        Ok(())
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        let Some((tip, _)) = self.last_entry()? else {
            return Ok(());
        };
        if tip <= new_tip {
            return Ok(());
        }

        let mut batch = SchemaBatch::new();
        for height in (new_tip + 1)..=tip {
            batch.delete::<BlockSchema>(&height)?;
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn get_chain_tip(&self) -> DbResult<Option<u64>> {
        Ok(self.last_entry()?.map(|(height, _)| height))
    }

    fn get_block_at(&self, height: u64) -> DbResult<Option<BlockRecord>> {
        Ok(self.db.get::<BlockSchema>(&height)?)
    }

    fn get_block_range(&self, start: u64, end: u64) -> DbResult<Vec<BlockRecord>> {
        let mut out = Vec::new();
        for height in start..end {
            if let Some(block) = self.db.get::<BlockSchema>(&height)? {
                out.push(block);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use tapnet_primitives::test_utils::ArbitraryGenerator;

    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;

    fn setup_db() -> BlockDb {
        let (db, db_ops) = get_rocksdb_tmp_instance().unwrap();
        BlockDb::new(db, db_ops)
    }

    fn gen_block_at(height: u64) -> BlockRecord {
        let mut block: BlockRecord = ArbitraryGenerator::new().generate();
        block = BlockRecord::new(
            height,
            *block.block_hash(),
            *block.prev_hash(),
            *block.merkle_root(),
            *block.receipt_root(),
            *block.storage_root(),
            *block.checksum_root(),
            block.checksum_proofs().to_vec(),
            block.tx_count(),
            block.raw_header().to_vec(),
        );
        block
    }

    #[test]
    fn test_put_block_out_of_order_rejected() {
        let db = setup_db();
        db.put_block(gen_block_at(10)).unwrap();
        db.put_block(gen_block_at(11)).unwrap();

        let res = db.put_block(gen_block_at(13));
        assert!(
            matches!(res, Err(DbError::OooInsert("block_entry", 13))),
            "gap insert must be rejected"
        );
    }

    #[test]
    fn test_revert_deletes_above_new_tip() {
        let db = setup_db();
        for h in 0..=5 {
            db.put_block(gen_block_at(h)).unwrap();
        }

        db.revert_to_height(2).unwrap();

        assert_eq!(db.get_chain_tip().unwrap(), Some(2));
        assert!(db.get_block_at(3).unwrap().is_none());
        assert!(db.get_block_at(2).unwrap().is_some());
    }

    #[test]
    fn test_put_header_idempotent() {
        let db = setup_db();
        let block = gen_block_at(100);
        db.put_header(block.clone()).unwrap();
        db.put_header(block.clone()).unwrap();
        assert_eq!(db.get_block_at(100).unwrap(), Some(block));
    }

    #[test]
    fn test_set_block_checksum() {
        let db = setup_db();
        db.put_header(gen_block_at(7)).unwrap();

        let root = Buf32::from([3; 32]);
        db.set_block_checksum(7, root, vec![vec![1, 2]]).unwrap();

        let got = db.get_block_at(7).unwrap().unwrap();
        assert_eq!(*got.checksum_root(), root);
        assert_eq!(got.checksum_proofs(), &[vec![1u8, 2]]);

        let missing = db.set_block_checksum(8, root, vec![]);
        assert!(matches!(missing, Err(DbError::MissingEntry(_, 8))));
    }
}
