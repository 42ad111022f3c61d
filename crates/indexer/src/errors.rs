use tapnet_db::errors::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("block {0} missing from database")]
    MissingBlock(u64),

    /// (expected, got)
    #[error("fetched block height mismatch (expected {0}, got {1})")]
    HeightMismatch(u64, u64),

    /// Commit failed with no reorg in flight; we treat the local state as
    /// suspect and roll one block back.
    #[error("local corruption suspected at height {0}: {1}")]
    LocalCorruption(u64, String),

    #[error("cancelled")]
    Cancelled,

    #[error("parse worker: {0}")]
    ParseWorker(String),

    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Other(String),
}

pub type IndexerResult<T> = Result<T, IndexerError>;
