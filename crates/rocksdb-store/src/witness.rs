use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::errors::DbError;
use tapnet_db::traits::WitnessDatabase;
use tapnet_db::DbResult;
use tapnet_primitives::buf::Buf64;
use tapnet_primitives::witness::BlockWitness;

use crate::macros::define_table_with_seek_key_codec;
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// Attestations keyed by block then signer identity.
    (WitnessSchema) (u64, Buf64) => BlockWitness
);

pub struct WitnessDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl WitnessDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl WitnessDatabase for WitnessDb {
    fn insert_witness(&self, witness: BlockWitness) -> DbResult<bool> {
        let key = (witness.block_number, witness.identity);
        // First receipt wins; later packets for the same identity are noise.
        if self.db.get::<WitnessSchema>(&key)?.is_some() {
            return Ok(false);
        }
        self.db.put::<WitnessSchema>(&key, &witness)?;
        Ok(true)
    }

    fn set_witness_proofs(
        &self,
        block_number: u64,
        identity: Buf64,
        proofs: Vec<Vec<u8>>,
    ) -> DbResult<()> {
        let key = (block_number, identity);
        let mut witness = self
            .db
            .get::<WitnessSchema>(&key)?
            .ok_or(DbError::MissingEntry("block_witness", block_number))?;
        witness.proofs = Some(proofs);
        self.db.put::<WitnessSchema>(&key, &witness)?;
        Ok(())
    }

    fn get_witnesses_for_block(&self, block_number: u64) -> DbResult<Vec<BlockWitness>> {
        let mut out = Vec::new();
        let mut iterator = self.db.iter::<WitnessSchema>()?;
        iterator.seek(&(block_number, Buf64::zero()))?;
        for res in iterator {
            let ((blk, _), witness) = res?.into_tuple();
            if blk != block_number {
                break;
            }
            out.push(witness);
        }
        Ok(out)
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        let mut doomed = Vec::new();
        let mut iterator = self.db.iter::<WitnessSchema>()?;
        iterator.seek(&(new_tip + 1, Buf64::zero()))?;
        for res in iterator {
            let (key, _) = res?.into_tuple();
            doomed.push(key);
        }

        let mut batch = SchemaBatch::new();
        for key in &doomed {
            batch.delete::<WitnessSchema>(key)?;
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}
