use tapnet_db::errors::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("overlay consensus not active yet")]
    ConsensusNotReached,

    #[error("node is not synced, broadcast disabled")]
    NotSynced,

    /// (size, limit)
    #[error("transaction size {0} exceeds limit {1}")]
    TooLarge(usize, usize),

    #[error("transaction already known")]
    AlreadyKnown,

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("base chain rejected transaction: {0}")]
    ChainRejected(String),

    #[error("db: {0}")]
    Db(#[from] DbError),
}

pub type MempoolResult<T> = Result<T, MempoolError>;
