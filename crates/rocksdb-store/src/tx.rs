use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::traits::TransactionDatabase;
use tapnet_db::DbResult;
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::tx::TransactionRecord;

use crate::macros::{define_table_with_default_codec, define_table_with_seek_key_codec};
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// All overlay transactions of one block, keyed by height.
    (BlockTxsSchema) u64 => Vec<TransactionRecord>
);

define_table_with_default_codec!(
    /// Lookup index from txid to its position.
    (TxidIndexSchema) Buf32 => (u64, u32)
);

pub struct TxDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl TxDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl TransactionDatabase for TxDb {
    fn put_block_txs(&self, height: u64, txs: Vec<TransactionRecord>) -> DbResult<()> {
        let mut batch = SchemaBatch::new();

        // Drop index rows of any previous set for this height before the
        // replacement lands.
        if let Some(old) = self.db.get::<BlockTxsSchema>(&height)? {
            for tx in &old {
                batch.delete::<TxidIndexSchema>(tx.txid())?;
            }
        }

        for (i, tx) in txs.iter().enumerate() {
            batch.put::<TxidIndexSchema>(tx.txid(), &(height, i as u32))?;
        }
        batch.put::<BlockTxsSchema>(&height, &txs)?;
        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn get_block_txs(&self, height: u64) -> DbResult<Vec<TransactionRecord>> {
        Ok(self.db.get::<BlockTxsSchema>(&height)?.unwrap_or_default())
    }

    fn get_tx_by_id(&self, txid: Buf32) -> DbResult<Option<TransactionRecord>> {
        let Some((height, idx)) = self.db.get::<TxidIndexSchema>(&txid)? else {
            return Ok(None);
        };
        let txs = self.get_block_txs(height)?;
        Ok(txs.into_iter().nth(idx as usize))
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        let Some((tip, _)) = rockbound::utils::get_last::<BlockTxsSchema>(&*self.db)? else {
            return Ok(());
        };
        if tip <= new_tip {
            return Ok(());
        }

        let mut batch = SchemaBatch::new();
        for height in (new_tip + 1)..=tip {
            if let Some(txs) = self.db.get::<BlockTxsSchema>(&height)? {
                for tx in &txs {
                    batch.delete::<TxidIndexSchema>(tx.txid())?;
                }
                batch.delete::<BlockTxsSchema>(&height)?;
            }
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}
