//! Chain tip poller.  Watches the base chain and publishes tip advances over
//! a watch channel every worker can subscribe to.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tapnet_status::StatusChannel;
use tokio::sync::watch;
use tracing::*;

use crate::rpc::traits::ReaderRpc;
use crate::status::{apply_status_updates, ChainStatusUpdate};

/// Most recent observed tip.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainTip {
    pub height: u64,
}

pub fn tip_channel() -> (watch::Sender<ChainTip>, watch::Receiver<ChainTip>) {
    watch::channel(ChainTip::default())
}

/// Polls the chain tip forever, emitting on every advance.  Errors are
/// reflected in the status channel and retried on the next tick.
pub async fn tip_poll_task(
    client: Arc<impl ReaderRpc>,
    tip_tx: watch::Sender<ChainTip>,
    poll_dur_ms: u32,
    status_channel: StatusChannel,
) -> anyhow::Result<()> {
    let poll_dur = Duration::from_millis(poll_dur_ms as u64);
    let mut last_seen = 0u64;
    info!("started chain tip poller");

    loop {
        let mut status_updates = Vec::new();

        match client.get_blockchain_info().await {
            Ok(info) => {
                status_updates.push(ChainStatusUpdate::RpcConnected(true));
                status_updates.push(ChainStatusUpdate::CurHeight(info.blocks));
                status_updates.push(ChainStatusUpdate::CurTip(info.bestblockhash.clone()));

                if info.blocks != last_seen {
                    debug!(height = %info.blocks, "chain tip advanced");
                    last_seen = info.blocks;
                    if tip_tx.send(ChainTip { height: info.blocks }).is_err() {
                        // All receivers gone; the indexer is shutting down.
                        info!("tip watchers gone, poller exiting");
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                warn!(err = %e, "failed to poll chain tip");
                status_updates.push(ChainStatusUpdate::RpcConnected(false));
                status_updates.push(ChainStatusUpdate::RpcError(e.to_string()));
            }
        }

        status_updates.push(ChainStatusUpdate::LastUpdate(now_millis()));
        apply_status_updates(&status_updates, &status_channel);

        tokio::time::sleep(poll_dur).await;
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}
