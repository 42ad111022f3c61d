use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("tried to insert into {0} out-of-order index {1}")]
    OooInsert(&'static str, u64),

    #[error("missing {0} entry at {1}")]
    MissingEntry(&'static str, u64),

    /// (expected next, got)
    #[error("non-monotonic height write (expected {0}, got {1})")]
    NonMonotonicHeight(u64, u64),

    #[error("duplicate key {0} not allowed")]
    DuplicateKey(String),

    #[error("not yet bootstrapped")]
    NotBootstrapped,

    #[error("codec: {0}")]
    Codec(String),

    #[error("rocksdb: {0}")]
    Rocksdb(String),

    #[error("db worker dropped the response channel")]
    WorkerFailedStrangely,

    #[error("not yet implemented")]
    Unimplemented,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for DbError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
