use std::collections::HashSet;
use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::traits::MempoolDatabase;
use tapnet_db::types::{MempoolEntry, MempoolInput};
use tapnet_db::DbResult;
use tapnet_primitives::buf::Buf32;

use crate::macros::define_table_with_default_codec;
use crate::DbOpsConfig;

define_table_with_default_codec!(
    /// Pending transactions keyed by id.
    (MempoolSchema) Buf32 => MempoolEntry
);

define_table_with_default_codec!(
    /// Spent-outpoint index, `(prev_txid, prev_vout)` to spender id.
    (MempoolSpentIndexSchema) (Buf32, u32) => Buf32
);

pub struct MempoolDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl MempoolDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }

    fn delete_entry_batch(&self, batch: &mut SchemaBatch, entry: &MempoolEntry) -> DbResult<()> {
        for input in &entry.inputs {
            batch.delete::<MempoolSpentIndexSchema>(&(input.prev_txid, input.prev_vout))?;
        }
        batch.delete::<MempoolSchema>(&entry.id)?;
        Ok(())
    }

    fn sweep(&self, keep: impl Fn(&MempoolEntry) -> bool) -> DbResult<usize> {
        let mut batch = SchemaBatch::new();
        let mut removed = 0;
        let mut iterator = self.db.iter::<MempoolSchema>()?;
        iterator.seek_to_first();
        for res in iterator {
            let (_, entry) = res?.into_tuple();
            if !keep(&entry) {
                self.delete_entry_batch(&mut batch, &entry)?;
                removed += 1;
            }
        }
        self.db.write_schemas(batch)?;
        Ok(removed)
    }
}

impl MempoolDatabase for MempoolDb {
    fn put_entry(&self, entry: MempoolEntry) -> DbResult<()> {
        let mut batch = SchemaBatch::new();
        // Replacing an entry with different inputs must not leak stale index
        // rows.
        if let Some(old) = self.db.get::<MempoolSchema>(&entry.id)? {
            self.delete_entry_batch(&mut batch, &old)?;
        }
        for input in &entry.inputs {
            batch.put::<MempoolSpentIndexSchema>(
                &(input.prev_txid, input.prev_vout),
                &entry.id,
            )?;
        }
        batch.put::<MempoolSchema>(&entry.id, &entry)?;
        self.db.write_schemas(batch)?;
        Ok(())
    }

    fn get_entry(&self, id: Buf32) -> DbResult<Option<MempoolEntry>> {
        Ok(self.db.get::<MempoolSchema>(&id)?)
    }

    fn has_entry(&self, id: Buf32) -> DbResult<bool> {
        Ok(self.db.get::<MempoolSchema>(&id)?.is_some())
    }

    fn delete_entries(&self, ids: Vec<Buf32>) -> DbResult<usize> {
        let mut batch = SchemaBatch::new();
        let mut removed = 0;
        for id in &ids {
            if let Some(entry) = self.db.get::<MempoolSchema>(id)? {
                self.delete_entry_batch(&mut batch, &entry)?;
                removed += 1;
            }
        }
        self.db.write_schemas(batch)?;
        Ok(removed)
    }

    fn find_conflicting(&self, inputs: Vec<MempoolInput>) -> DbResult<Vec<MempoolEntry>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for input in &inputs {
            let key = (input.prev_txid, input.prev_vout);
            if let Some(spender) = self.db.get::<MempoolSpentIndexSchema>(&key)? {
                if seen.insert(spender) {
                    if let Some(entry) = self.db.get::<MempoolSchema>(&spender)? {
                        out.push(entry);
                    }
                }
            }
        }
        Ok(out)
    }

    fn find_direct_descendants(&self, txid: Buf32) -> DbResult<Vec<MempoolEntry>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut iterator = self.db.iter::<MempoolSpentIndexSchema>()?;
        iterator.seek_to_first();
        for res in iterator {
            let ((prev_txid, _), spender) = res?.into_tuple();
            if prev_txid == txid && seen.insert(spender) {
                if let Some(entry) = self.db.get::<MempoolSchema>(&spender)? {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    fn delete_greater_than_block_height(&self, height: u64) -> DbResult<usize> {
        if height == 0 {
            return self.sweep(|_| false);
        }
        self.sweep(|e| e.block_height <= height)
    }

    fn delete_older_than_block_height(&self, height: u64) -> DbResult<usize> {
        self.sweep(|e| e.block_height > height)
    }
}

#[cfg(test)]
mod tests {
    use tapnet_db::types::MempoolOutput;
    use tapnet_primitives::tx::TxKind;

    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;

    fn setup_db() -> MempoolDb {
        let (db, db_ops) = get_rocksdb_tmp_instance().unwrap();
        MempoolDb::new(db, db_ops)
    }

    fn gen_entry(id: u8, height: u64, inputs: Vec<(u8, u32)>) -> MempoolEntry {
        MempoolEntry {
            id: Buf32::from([id; 32]),
            raw: vec![id],
            psbt: false,
            block_height: height,
            first_seen: 0,
            kind: TxKind::Generic,
            inputs: inputs
                .into_iter()
                .map(|(txid, vout)| MempoolInput {
                    prev_txid: Buf32::from([txid; 32]),
                    prev_vout: vout,
                })
                .collect(),
            outputs: vec![MempoolOutput {
                value: 1000,
                script_pubkey: vec![0x51],
                address: None,
            }],
            from: None,
            contract_address: None,
            calldata: None,
            bytecode: None,
            theoretical_gas_limit: 0,
            priority_fee: 0,
        }
    }

    #[test]
    fn test_unique_by_id() {
        let db = setup_db();
        db.put_entry(gen_entry(1, 10, vec![(100, 0)])).unwrap();
        db.put_entry(gen_entry(1, 11, vec![(100, 1)])).unwrap();

        let entry = db.get_entry(Buf32::from([1; 32])).unwrap().unwrap();
        assert_eq!(entry.block_height, 11, "later put must replace");

        // The old index row must be gone too.
        let conflicts = db
            .find_conflicting(vec![MempoolInput {
                prev_txid: Buf32::from([100; 32]),
                prev_vout: 0,
            }])
            .unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_find_conflicting_by_outpoint() {
        let db = setup_db();
        db.put_entry(gen_entry(1, 10, vec![(100, 0)])).unwrap();
        db.put_entry(gen_entry(2, 10, vec![(100, 1)])).unwrap();

        let conflicts = db
            .find_conflicting(vec![MempoolInput {
                prev_txid: Buf32::from([100; 32]),
                prev_vout: 0,
            }])
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, Buf32::from([1; 32]));
    }

    #[test]
    fn test_find_direct_descendants() {
        let db = setup_db();
        // Entry 2 spends output 0 of entry 1's txid.
        db.put_entry(gen_entry(2, 10, vec![(1, 0)])).unwrap();
        db.put_entry(gen_entry(3, 10, vec![(2, 0)])).unwrap();

        let descendants = db.find_direct_descendants(Buf32::from([1; 32])).unwrap();
        assert_eq!(descendants.len(), 1);
        assert_eq!(descendants[0].id, Buf32::from([2; 32]));
    }

    #[test]
    fn test_delete_greater_than_block_height() {
        let db = setup_db();
        db.put_entry(gen_entry(1, 5, vec![(100, 0)])).unwrap();
        db.put_entry(gen_entry(2, 8, vec![(100, 1)])).unwrap();
        db.put_entry(gen_entry(3, 12, vec![(100, 2)])).unwrap();

        let removed = db.delete_greater_than_block_height(8).unwrap();
        assert_eq!(removed, 1);
        assert!(db.has_entry(Buf32::from([1; 32])).unwrap());
        assert!(db.has_entry(Buf32::from([2; 32])).unwrap());
        assert!(!db.has_entry(Buf32::from([3; 32])).unwrap());

        // Height 0 wipes everything.
        let removed = db.delete_greater_than_block_height(0).unwrap();
        assert_eq!(removed, 2);
        assert!(!db.has_entry(Buf32::from([1; 32])).unwrap());
    }
}
