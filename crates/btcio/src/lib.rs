//! Base-chain I/O: the JSON-RPC client, the block prefetch ring and the tip
//! poller.

pub mod prefetch;
pub mod rpc;
pub mod status;
pub mod tip;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use rpc::client::BitcoinClient;
pub use rpc::traits::{BroadcasterRpc, MempoolRpc, ReaderRpc};
