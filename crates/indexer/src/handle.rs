//! Indexer handle: how other workers and the API façade talk to the
//! indexer worker.

use tapnet_primitives::buf::Buf32;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::messages::{ChainEvent, IndexerMessage, ValidateHeadersResponse};

#[derive(Clone)]
pub struct IndexerHandle {
    msg_tx: mpsc::Sender<IndexerMessage>,
    event_tx: broadcast::Sender<ChainEvent>,
}

impl IndexerHandle {
    pub fn new(
        msg_tx: mpsc::Sender<IndexerMessage>,
        event_tx: broadcast::Sender<ChainEvent>,
    ) -> Self {
        Self { msg_tx, event_tx }
    }

    /// Chain events feed: block commits and reorgs.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent> {
        self.event_tx.subscribe()
    }

    /// Highest committed block number.
    pub async fn current_block(&self) -> anyhow::Result<u64> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.msg_tx
            .send(IndexerMessage::CurrentBlock(resp_tx))
            .await
            .map_err(|_| anyhow::anyhow!("indexer worker gone"))?;
        Ok(resp_rx.await?)
    }

    /// Checks a claimed block header checksum against stored state.
    pub async fn validate_block_headers(
        &self,
        height: u64,
        claimed_checksum: Buf32,
    ) -> anyhow::Result<ValidateHeadersResponse> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.msg_tx
            .send(IndexerMessage::ValidateBlockHeaders {
                height,
                claimed_checksum,
                resp: resp_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("indexer worker gone"))?;
        Ok(resp_rx.await?)
    }
}
