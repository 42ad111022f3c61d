use thiserror::Error;

/// Errors produced while decoding a transaction that did match an overlay
/// template.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Commitments inside the script don't line up with the witness data.
    #[error("malformed witness: {0}")]
    MalformedWitness(&'static str),

    /// Decompressed calldata exceeds the consensus cap.
    #[error("calldata too large ({len} > {max})")]
    CalldataLimit { len: usize, max: usize },

    /// Compressed calldata that doesn't decompress.
    #[error("calldata decompression: {0}")]
    Decompress(String),

    /// Wrap vault keys that don't aggregate into a usable key.
    #[error("invalid vault key set: {0}")]
    InvalidVaultKeys(String),
}
