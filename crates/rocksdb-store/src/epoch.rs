use std::sync::Arc;

use rockbound::{OptimisticTransactionDB, SchemaBatch, SchemaDBOperationsExt};
use tapnet_db::traits::EpochDatabase;
use tapnet_db::DbResult;
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::epoch::{EpochRecord, EpochSubmission};

use crate::macros::define_table_with_seek_key_codec;
use crate::DbOpsConfig;

define_table_with_seek_key_codec!(
    /// Epoch documents keyed by epoch number.
    (EpochSchema) u64 => EpochRecord
);

define_table_with_seek_key_codec!(
    /// Proposer submissions keyed by epoch then submission hash.
    (EpochSubmissionSchema) (u64, Buf32) => EpochSubmission
);

pub struct EpochDb {
    db: Arc<OptimisticTransactionDB>,
    _ops: DbOpsConfig,
}

impl EpochDb {
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig) -> Self {
        Self { db, _ops: ops }
    }
}

impl EpochDatabase for EpochDb {
    fn put_epoch(&self, epoch: EpochRecord) -> DbResult<()> {
        self.db.put::<EpochSchema>(&epoch.epoch_number, &epoch)?;
        Ok(())
    }

    fn get_epoch(&self, epoch_number: u64) -> DbResult<Option<EpochRecord>> {
        Ok(self.db.get::<EpochSchema>(&epoch_number)?)
    }

    fn get_last_epoch(&self) -> DbResult<Option<EpochRecord>> {
        Ok(rockbound::utils::get_last::<EpochSchema>(&*self.db)?.map(|(_, e)| e))
    }

    fn put_submission(&self, submission: EpochSubmission) -> DbResult<()> {
        let key = (submission.epoch_number, submission.submission_hash);
        self.db.put::<EpochSubmissionSchema>(&key, &submission)?;
        Ok(())
    }

    fn get_submissions(&self, epoch_number: u64) -> DbResult<Vec<EpochSubmission>> {
        let mut out = Vec::new();
        let mut iterator = self.db.iter::<EpochSubmissionSchema>()?;
        iterator.seek(&(epoch_number, Buf32::zero()))?;
        for res in iterator {
            let ((epoch, _), sub) = res?.into_tuple();
            if epoch != epoch_number {
                break;
            }
            out.push(sub);
        }
        Ok(out)
    }

    fn revert_to_height(&self, new_tip: u64) -> DbResult<()> {
        let Some(last) = self.get_last_epoch()? else {
            return Ok(());
        };

        let mut batch = SchemaBatch::new();
        for number in 0..=last.epoch_number {
            let Some(epoch) = self.get_epoch(number)? else {
                continue;
            };
            if epoch.start_block > new_tip {
                for sub in self.get_submissions(number)? {
                    batch.delete::<EpochSubmissionSchema>(&(number, sub.submission_hash))?;
                }
                batch.delete::<EpochSchema>(&number)?;
            } else if epoch.end_block > new_tip {
                // The epoch straddles the fork point; it goes back to being
                // the active epoch.
                let mut reopened = epoch;
                reopened.end_block = tapnet_primitives::constants::EPOCH_ACTIVE_SENTINEL;
                reopened.proposer = None;
                batch.put::<EpochSchema>(&number, &reopened)?;
            }
        }
        self.db.write_schemas(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tapnet_primitives::constants::EPOCH_ACTIVE_SENTINEL;
    use tapnet_primitives::test_utils::ArbitraryGenerator;

    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;

    fn setup_db() -> EpochDb {
        let (db, db_ops) = get_rocksdb_tmp_instance().unwrap();
        EpochDb::new(db, db_ops)
    }

    fn gen_epoch(number: u64, start: u64, end: u64) -> EpochRecord {
        let mut epoch: EpochRecord = ArbitraryGenerator::new().generate();
        epoch.epoch_number = number;
        epoch.start_block = start;
        epoch.end_block = end;
        epoch
    }

    #[test]
    fn test_last_epoch() {
        let db = setup_db();
        db.put_epoch(gen_epoch(0, 0, 4)).unwrap();
        db.put_epoch(gen_epoch(1, 5, 9)).unwrap();

        let last = db.get_last_epoch().unwrap().unwrap();
        assert_eq!(last.epoch_number, 1);
    }

    #[test]
    fn test_revert_drops_and_reopens() {
        let db = setup_db();
        db.put_epoch(gen_epoch(0, 0, 4)).unwrap();
        db.put_epoch(gen_epoch(1, 5, 9)).unwrap();
        db.put_epoch(gen_epoch(2, 10, 14)).unwrap();

        // Fork lands inside epoch 1.
        db.revert_to_height(7).unwrap();

        assert!(db.get_epoch(2).unwrap().is_none(), "epoch above fork gone");
        let reopened = db.get_epoch(1).unwrap().unwrap();
        assert_eq!(reopened.end_block, EPOCH_ACTIVE_SENTINEL);
        assert!(reopened.proposer.is_none());
        assert!(db.get_epoch(0).unwrap().is_some());
    }

    #[test]
    fn test_submissions_scoped_to_epoch() {
        let db = setup_db();
        let gen = ArbitraryGenerator::new();
        let mut s1: EpochSubmission = gen.generate();
        s1.epoch_number = 1;
        s1.submission_hash = Buf32::from([1; 32]);
        let mut s2: EpochSubmission = gen.generate();
        s2.epoch_number = 1;
        s2.submission_hash = Buf32::from([2; 32]);
        let mut s3: EpochSubmission = gen.generate();
        s3.epoch_number = 2;
        s3.submission_hash = Buf32::from([3; 32]);

        db.put_submission(s1).unwrap();
        db.put_submission(s2).unwrap();
        db.put_submission(s3).unwrap();

        assert_eq!(db.get_submissions(1).unwrap().len(), 2);
        assert_eq!(db.get_submissions(2).unwrap().len(), 1);
    }
}
