//! Events the indexer broadcasts to the other workers and the request
//! messages its handle accepts.

use tapnet_primitives::block::BlockRecord;
use tapnet_primitives::buf::Buf32;
use tokio::sync::oneshot;

/// Broadcast to every worker on chain progression.  Witness manager derives
/// attestation digests from `BlockCommitted`; the mempool reacts to both.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    BlockCommitted {
        height: u64,
        block_hash: Buf32,
        prev_hash: Buf32,
        checksum_root: Buf32,
        prev_checksum: Buf32,
    },

    /// The base chain reorganized; all data at `from_height..` was dropped.
    Reorg { from_height: u64, to_height: u64 },
}

/// Requests served by the indexer worker, correlated by the oneshot.
#[derive(Debug)]
pub enum IndexerMessage {
    /// Highest committed block number.
    CurrentBlock(oneshot::Sender<u64>),

    /// Fetch the stored header record and check the claimed checksum against
    /// it.
    ValidateBlockHeaders {
        height: u64,
        claimed_checksum: Buf32,
        resp: oneshot::Sender<ValidateHeadersResponse>,
    },
}

/// What the API façade relays to clients for header validation.
#[derive(Clone, Debug)]
pub struct ValidateHeadersResponse {
    pub stored_block_header: Option<BlockRecord>,
    pub has_valid_proofs: bool,
}
