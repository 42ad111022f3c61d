use std::time::Duration;

use async_trait::async_trait;
use bitcoin::block::Header;
use bitcoin::consensus::encode::deserialize;
use bitcoin::{Block, BlockHash, Txid};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::*;

use super::error::{ClientError, ClientResult};
use super::traits::{BroadcasterRpc, MempoolRpc, ReaderRpc};
use super::types::{RpcBlockchainInfo, RpcEstimateSmartFee, RpcMempoolInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcServerError>,
}

#[derive(Deserialize)]
struct RpcServerError {
    code: i64,
    message: String,
}

/// JSON-RPC client for a bitcoind-compatible base chain node.
///
/// Treats every transport failure as transient; callers decide whether to
/// retry or leave the slot empty.
#[derive(Debug)]
pub struct BitcoinClient {
    url: String,
    client: reqwest::Client,
    user: String,
    password: String,
}

impl BitcoinClient {
    pub fn new(url: String, user: String, password: String) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Other(format!("building http client: {e}")))?;
        Ok(Self {
            url,
            client,
            user,
            password,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ClientResult<T> {
        trace!(%method, "rpc call");
        let body = json!({
            "jsonrpc": "1.0",
            "id": "tapnet",
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let text = resp.text().await?;
        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;

        if let Some(err) = parsed.error {
            return Err(ClientError::Server {
                code: err.code,
                message: err.message,
            });
        }
        parsed.result.ok_or(ClientError::MissingResult)
    }
}

#[async_trait]
impl ReaderRpc for BitcoinClient {
    async fn get_block_count(&self) -> ClientResult<u64> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash> {
        let hash_hex: String = self.call("getblockhash", json!([height])).await?;
        hash_hex
            .parse::<BlockHash>()
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn get_block_at(&self, height: u64) -> ClientResult<Block> {
        let hash = self.get_block_hash(height).await?;
        // Verbosity 0 gives us raw hex we can consensus-decode.
        let block_hex: String = self
            .call("getblock", json!([hash.to_string(), 0]))
            .await?;
        let raw = hex::decode(&block_hex).map_err(|e| ClientError::Parse(e.to_string()))?;
        deserialize(&raw).map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn get_block_header_at(&self, height: u64) -> ClientResult<Header> {
        let hash = self.get_block_hash(height).await?;
        let header_hex: String = self
            .call("getblockheader", json!([hash.to_string(), false]))
            .await?;
        let raw = hex::decode(&header_hex).map_err(|e| ClientError::Parse(e.to_string()))?;
        deserialize(&raw).map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn get_blockchain_info(&self) -> ClientResult<RpcBlockchainInfo> {
        self.call("getblockchaininfo", json!([])).await
    }
}

#[async_trait]
impl BroadcasterRpc for BitcoinClient {
    async fn send_raw_transaction(&self, raw: &[u8]) -> ClientResult<Txid> {
        let txid_hex: String = self
            .call("sendrawtransaction", json!([hex::encode(raw)]))
            .await?;
        txid_hex
            .parse::<Txid>()
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

#[async_trait]
impl MempoolRpc for BitcoinClient {
    async fn estimate_smart_fee(&self, conf_target: u16) -> ClientResult<RpcEstimateSmartFee> {
        self.call("estimatesmartfee", json!([conf_target])).await
    }

    async fn get_mempool_info(&self) -> ClientResult<RpcMempoolInfo> {
        self.call("getmempoolinfo", json!([])).await
    }
}
