//! Mock RPC clients for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{Block, BlockHash, CompactTarget, TxMerkleNode};

use crate::rpc::error::{ClientError, ClientResult};
use crate::rpc::traits::ReaderRpc;
use crate::rpc::types::RpcBlockchainInfo;

/// Builds a linked chain of empty blocks starting from the all-zero hash.
/// The `salt` lets tests build a conflicting fork that diverges after some
/// height.
pub fn build_test_chain(len: usize, salt: u32) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(len);
    let mut prev = BlockHash::from_byte_array([0; 32]);
    for i in 0..len {
        let header = Header {
            version: Version::ONE,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::from_byte_array([i as u8; 32]),
            time: 1_600_000_000 + i as u32,
            bits: CompactTarget::from_consensus(0x20ffffff),
            nonce: salt,
        };
        let block = Block {
            header,
            txdata: vec![],
        };
        prev = block.block_hash();
        blocks.push(block);
    }
    blocks
}

/// In-memory reader; height indexes directly into the chain vec.
pub struct TestReader {
    chain: Mutex<Vec<Block>>,
    pub block_fetches: AtomicUsize,
    pub hash_fetches: AtomicUsize,
}

impl TestReader {
    pub fn new(chain: Vec<Block>) -> Self {
        Self {
            chain: Mutex::new(chain),
            block_fetches: AtomicUsize::new(0),
            hash_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_chain_len(len: usize) -> Self {
        Self::new(build_test_chain(len, 0))
    }

    /// Swaps the chain out from under the reader, simulating a reorg.
    pub fn set_chain(&self, chain: Vec<Block>) {
        *self.chain.lock().unwrap() = chain;
    }

    fn block_at(&self, height: u64) -> ClientResult<Block> {
        self.chain
            .lock()
            .unwrap()
            .get(height as usize)
            .cloned()
            .ok_or(ClientError::Server {
                code: -8,
                message: "Block height out of range".to_string(),
            })
    }

    fn tip_height(&self) -> u64 {
        (self.chain.lock().unwrap().len() as u64).saturating_sub(1)
    }
}

#[async_trait]
impl ReaderRpc for TestReader {
    async fn get_block_count(&self) -> ClientResult<u64> {
        Ok(self.tip_height())
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash> {
        self.hash_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.block_at(height)?.block_hash())
    }

    async fn get_block_at(&self, height: u64) -> ClientResult<Block> {
        self.block_fetches.fetch_add(1, Ordering::Relaxed);
        self.block_at(height)
    }

    async fn get_block_header_at(&self, height: u64) -> ClientResult<Header> {
        Ok(self.block_at(height)?.header)
    }

    async fn get_blockchain_info(&self) -> ClientResult<RpcBlockchainInfo> {
        let tip = self.tip_height();
        let best = self.block_at(tip)?.block_hash();
        Ok(RpcBlockchainInfo {
            blocks: tip,
            bestblockhash: best.to_string(),
            chain: "regtest".to_string(),
            initialblockdownload: false,
        })
    }
}
