use async_trait::async_trait;
use bitcoin::block::Header;
use bitcoin::{Block, BlockHash, Txid};

use super::error::ClientResult;
use super::types::{RpcBlockchainInfo, RpcEstimateSmartFee, RpcMempoolInfo};

/// Read-side queries the indexer issues against the base chain.
#[async_trait]
pub trait ReaderRpc: Sync + Send + 'static {
    /// Height of the longest chain.
    async fn get_block_count(&self) -> ClientResult<u64>;

    /// Block hash at the given height.
    async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash>;

    /// Full block at the given height.
    async fn get_block_at(&self, height: u64) -> ClientResult<Block>;

    /// Header only, cheaper than the full body.
    async fn get_block_header_at(&self, height: u64) -> ClientResult<Header>;

    async fn get_blockchain_info(&self) -> ClientResult<RpcBlockchainInfo>;
}

/// Write-side: pushing raw transactions to the chain.
#[async_trait]
pub trait BroadcasterRpc: Sync + Send + 'static {
    /// Submits raw transaction bytes, returning the txid the chain assigned.
    async fn send_raw_transaction(&self, raw: &[u8]) -> ClientResult<Txid>;
}

/// Fee and occupancy queries the mempool worker issues.
#[async_trait]
pub trait MempoolRpc: Sync + Send + 'static {
    async fn estimate_smart_fee(&self, conf_target: u16) -> ClientResult<RpcEstimateSmartFee>;

    async fn get_mempool_info(&self) -> ClientResult<RpcMempoolInfo>;
}
