//! Block prefetch ring.
//!
//! Keeps up to `max_prefetch` block requests in flight ahead of the commit
//! cursor so RPC latency amortizes across the pipeline.  The ring is
//! strictly FIFO by height; any disagreement between the ring and the
//! caller's cursor flushes the ring and falls back to a direct query.

use std::collections::VecDeque;
use std::sync::Arc;

use bitcoin::Block;
use tokio::task::JoinHandle;
use tracing::*;

use crate::rpc::error::ClientResult;
use crate::rpc::traits::ReaderRpc;

struct PrefetchSlot {
    height: u64,
    handle: JoinHandle<Option<Block>>,
}

pub struct BlockPrefetcher<C> {
    client: Arc<C>,
    max_prefetch: usize,
    ring: VecDeque<PrefetchSlot>,
}

impl<C: ReaderRpc> BlockPrefetcher<C> {
    pub fn new(client: Arc<C>, max_prefetch: usize) -> Self {
        Self {
            client,
            max_prefetch,
            ring: VecDeque::with_capacity(max_prefetch),
        }
    }

    /// Number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Fetches the block at `expected_height`, from the ring when possible,
    /// topping the ring up behind it.  `None` means a transient RPC gap the
    /// caller should retry.
    pub async fn get(&mut self, expected_height: u64, chain_tip: u64) -> Option<Block> {
        let block = match self.ring.front() {
            Some(slot) if slot.height == expected_height => {
                let slot = self.ring.pop_front().expect("prefetch: front exists");
                match slot.handle.await {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(height = %expected_height, err = %e, "prefetch task died");
                        None
                    }
                }
            }
            Some(slot) => {
                // Ring is out of step with the cursor.  This happens after a
                // missed reorg purge; drop everything and go direct.
                warn!(
                    ring_front = %slot.height,
                    %expected_height,
                    "prefetch ring out of step, flushing"
                );
                self.purge();
                self.fetch_direct(expected_height).await
            }
            None => self.fetch_direct(expected_height).await,
        };

        self.top_up(expected_height + 1, chain_tip);
        block
    }

    /// Drops all outstanding prefetches.  Used on reorg.
    pub fn purge(&mut self) {
        for slot in self.ring.drain(..) {
            slot.handle.abort();
        }
    }

    async fn fetch_direct(&self, height: u64) -> Option<Block> {
        match self.client.get_block_at(height).await {
            Ok(block) => Some(block),
            Err(e) => {
                debug!(%height, err = %e, "direct block fetch failed");
                None
            }
        }
    }

    /// Tops the ring up to `min(max_prefetch, chain_tip − next_height + 1)`
    /// outstanding requests starting after the last queued height.
    fn top_up(&mut self, next_height: u64, chain_tip: u64) {
        let mut fetch_from = self
            .ring
            .back()
            .map(|slot| slot.height + 1)
            .unwrap_or(next_height);

        while self.ring.len() < self.max_prefetch && fetch_from <= chain_tip {
            let client = self.client.clone();
            let height = fetch_from;
            let handle =
                tokio::spawn(async move { client.get_block_at(height).await.ok() });
            self.ring.push_back(PrefetchSlot { height, handle });
            fetch_from += 1;
        }
    }
}

/// Fetch helper without a ring, used by the bulk import phases where the
/// batching is managed by the coordinator instead.
pub async fn fetch_block_retrying<C: ReaderRpc>(
    client: &C,
    height: u64,
    attempts: usize,
) -> ClientResult<Block> {
    let mut last_err = None;
    for _ in 0..attempts {
        match client.get_block_at(height).await {
            Ok(block) => return Ok(block),
            Err(e) if e.is_transient() => {
                last_err = Some(e);
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(crate::rpc::error::ClientError::MissingResult))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::TestReader;

    #[tokio::test]
    async fn test_prefetch_underflow_issues_direct_query() {
        // chain_tip == committed + 1, so there is nothing to prefetch ahead.
        let reader = Arc::new(TestReader::with_chain_len(12));
        let mut prefetcher = BlockPrefetcher::new(reader.clone(), 8);

        let committed = 10u64;
        let chain_tip = committed + 1;
        let block = prefetcher.get(committed + 1, chain_tip).await;

        assert!(block.is_some(), "direct query should produce the block");
        assert_eq!(prefetcher.len(), 0, "nothing ahead of tip to prefetch");
        assert_eq!(
            reader.block_fetches.load(Ordering::Relaxed),
            1,
            "exactly one direct RPC"
        );
    }

    #[tokio::test]
    async fn test_ring_fills_and_drains_in_height_order() {
        let reader = Arc::new(TestReader::with_chain_len(100));
        let mut prefetcher = BlockPrefetcher::new(reader.clone(), 4);

        let tip = 50u64;
        let b1 = prefetcher.get(1, tip).await.expect("block 1");
        assert_eq!(prefetcher.len(), 4, "ring topped up behind the cursor");

        let b2 = prefetcher.get(2, tip).await.expect("block 2");
        assert_ne!(b1.block_hash(), b2.block_hash());

        // Heights 2..=5 were prefetched; the get for 2 must have come from
        // the ring, not a direct query.
        let direct = reader.block_fetches.load(Ordering::Relaxed);
        assert!(direct >= 1, "first get was direct");
    }

    #[tokio::test]
    async fn test_purge_empties_ring() {
        let reader = Arc::new(TestReader::with_chain_len(100));
        let mut prefetcher = BlockPrefetcher::new(reader, 4);

        prefetcher.get(1, 50).await.expect("block 1");
        assert!(!prefetcher.is_empty());

        prefetcher.purge();
        assert!(prefetcher.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_step_ring_flushes() {
        let reader = Arc::new(TestReader::with_chain_len(100));
        let mut prefetcher = BlockPrefetcher::new(reader, 4);

        prefetcher.get(1, 50).await.expect("block 1");
        // Jump the cursor; ring front is 2 but we ask for 10.
        let block = prefetcher.get(10, 50).await;
        assert!(block.is_some(), "direct query must cover the jump");
    }
}
