//! RocksDB-backed implementations of the node database traits.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rockbound::{rocksdb, OptimisticTransactionDB};

pub mod acs;
pub mod block;
pub mod checkpoint;
pub mod epoch;
pub(crate) mod macros;
pub mod mempool;
pub mod pubkey;
pub mod reorg;
pub(crate) mod seek_key;
pub mod tx;
pub mod witness;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use acs::AcsDb;
pub use block::BlockDb;
pub use checkpoint::CheckpointDb;
pub use epoch::EpochDb;
pub use mempool::MempoolDb;
pub use pubkey::PublicKeyDb;
pub use reorg::ReorgDb;
pub use tx::TxDb;
pub use witness::WitnessDb;

pub const ROCKSDB_NAME: &str = "tapnet";

pub const STORE_COLUMN_FAMILIES: &[&str] = &[
    "BlockSchema",
    "BlockTxsSchema",
    "TxidIndexSchema",
    "WitnessSchema",
    "EpochSchema",
    "EpochSubmissionSchema",
    "MempoolSchema",
    "MempoolSpentIndexSchema",
    "IbdCheckpointSchema",
    "ReorgSchema",
    "MldsaKeySchema",
    "AnyoneCanSpendSchema",
];

/// Per-database operational knobs threaded into every db handle.
#[derive(Clone, Copy, Debug)]
pub struct DbOpsConfig {
    pub retry_count: u16,
}

impl DbOpsConfig {
    pub fn new(retry_count: u16) -> Self {
        Self { retry_count }
    }
}

/// Opens (creating if needed) the node database under the given datadir.
pub fn open_rocksdb_database(
    datadir: &Path,
    dbname: &'static str,
) -> anyhow::Result<Arc<OptimisticTransactionDB>> {
    let mut database_dir = datadir.to_path_buf();
    database_dir.push("rocksdb");

    if !database_dir.exists() {
        fs::create_dir_all(&database_dir)?;
    }

    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let rbdb = OptimisticTransactionDB::open(
        &database_dir,
        dbname,
        STORE_COLUMN_FAMILIES.iter().map(|s| s.to_string()),
        &opts,
    )?;

    Ok(Arc::new(rbdb))
}

/// Concrete database bundle the node runs over.
pub type CommonDb = tapnet_db::database::CommonDatabase<
    BlockDb,
    TxDb,
    WitnessDb,
    EpochDb,
    MempoolDb,
    CheckpointDb,
    ReorgDb,
    PublicKeyDb,
    AcsDb,
>;

/// Wires up all core collection handles over one rocksdb instance.
pub fn init_core_dbs(rbdb: Arc<OptimisticTransactionDB>, ops_config: DbOpsConfig) -> Arc<CommonDb> {
    let block_db = Arc::new(BlockDb::new(rbdb.clone(), ops_config));
    let tx_db = Arc::new(TxDb::new(rbdb.clone(), ops_config));
    let witness_db = Arc::new(WitnessDb::new(rbdb.clone(), ops_config));
    let epoch_db = Arc::new(EpochDb::new(rbdb.clone(), ops_config));
    let mempool_db = Arc::new(MempoolDb::new(rbdb.clone(), ops_config));
    let checkpoint_db = Arc::new(CheckpointDb::new(rbdb.clone(), ops_config));
    let reorg_db = Arc::new(ReorgDb::new(rbdb.clone(), ops_config));
    let pubkey_db = Arc::new(PublicKeyDb::new(rbdb.clone(), ops_config));
    let acs_db = Arc::new(AcsDb::new(rbdb, ops_config));
    Arc::new(tapnet_db::database::CommonDatabase::new(
        block_db,
        tx_db,
        witness_db,
        epoch_db,
        mempool_db,
        checkpoint_db,
        reorg_db,
        pubkey_db,
        acs_db,
    ))
}
