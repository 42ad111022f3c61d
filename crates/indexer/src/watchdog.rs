//! Reorg detection against the committed chain.

use std::sync::Arc;

use bitcoin::hashes::Hash;
use tapnet_btcio::ReaderRpc;
use tapnet_primitives::buf::Buf32;
use tapnet_storage::BlockDataOps;
use tracing::*;

use crate::errors::{IndexerError, IndexerResult};

/// What the watchdog reports when the base chain disagrees with us.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReorgEvent {
    /// First height that has to be discarded.
    pub from_height: u64,

    /// Our committed tip at detection time.
    pub to_height: u64,

    /// The chain's hash at the committed height, for logging.
    pub new_best_hash: Buf32,
}

/// Compares the chain's view at our committed height with what we stored.
/// On mismatch, walks backward one block at a time until the hashes agree;
/// that block is the fork point.
pub async fn detect_reorg(
    client: &impl ReaderRpc,
    block_ops: &Arc<BlockDataOps>,
    committed: u64,
    max_depth: u64,
) -> IndexerResult<Option<ReorgEvent>> {
    let Some(stored) = block_ops.get_block_at_async(committed).await? else {
        return Ok(None);
    };

    let chain_hash = fetch_hash(client, committed).await?;
    if chain_hash == *stored.block_hash() {
        return Ok(None);
    }

    info!(%committed, "committed tip hash no longer on the base chain");

    let deepest = committed.saturating_sub(max_depth);
    let mut height = committed;
    while height > deepest {
        height -= 1;
        let Some(stored) = block_ops.get_block_at_async(height).await? else {
            // Below what we have stored; treat the gap top as the pivot.
            break;
        };
        let chain_hash = fetch_hash(client, height).await?;
        trace!(%height, "comparing blocks to find fork point");
        if chain_hash == *stored.block_hash() {
            return Ok(Some(ReorgEvent {
                from_height: height + 1,
                to_height: committed,
                new_best_hash: chain_hash,
            }));
        }
    }

    Err(IndexerError::Other(format!(
        "no fork point within {max_depth} blocks of {committed}, manual intervention needed"
    )))
}

async fn fetch_hash(client: &impl ReaderRpc, height: u64) -> IndexerResult<Buf32> {
    let hash = client
        .get_block_hash(height)
        .await
        .map_err(|e| IndexerError::Other(format!("fetching hash at {height}: {e}")))?;
    Ok(Buf32::from(hash.to_byte_array()))
}

#[cfg(test)]
mod tests {
    use tapnet_btcio::test_utils::{build_test_chain, TestReader};
    use tapnet_db::traits::NodeDatabase;
    use tapnet_primitives::block::BlockRecord;
    use tapnet_rocksdb::test_utils::get_common_db;
    use tapnet_storage::ops::block::Context;

    use super::*;

    fn block_record_from(height: u64, block: &bitcoin::Block) -> BlockRecord {
        BlockRecord::new(
            height,
            Buf32::from(block.block_hash().to_byte_array()),
            Buf32::from(block.header.prev_blockhash.to_byte_array()),
            Buf32::from(block.header.merkle_root.to_byte_array()),
            Buf32::zero(),
            Buf32::zero(),
            Buf32::zero(),
            vec![],
            0,
            vec![],
        )
    }

    fn get_ops() -> Arc<BlockDataOps> {
        let pool = threadpool::Builder::new().num_threads(2).build();
        let db = get_common_db();
        Arc::new(Context::new(db.block_db().clone()).into_ops(pool))
    }

    #[tokio::test]
    async fn test_no_reorg_when_hashes_agree() {
        let chain = build_test_chain(10, 0);
        let reader = TestReader::new(chain.clone());
        let ops = get_ops();
        for (h, b) in chain.iter().enumerate() {
            ops.put_header_async(block_record_from(h as u64, b))
                .await
                .unwrap();
        }

        let res = detect_reorg(&reader, &ops, 9, 6).await.unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn test_reorg_at_depth_three() {
        // We committed chain A up to 100; the chain now runs fork B that
        // shares history only up to height 97.
        let chain_a = build_test_chain(101, 0);
        let mut chain_b = build_test_chain(101, 1);
        chain_b[..98].clone_from_slice(&chain_a[..98]);
        // Relink fork blocks above the shared prefix.
        let mut prev = chain_b[97].block_hash();
        for blk in chain_b.iter_mut().skip(98) {
            blk.header.prev_blockhash = prev;
            prev = blk.block_hash();
        }

        let reader = TestReader::new(chain_b);
        let ops = get_ops();
        for (h, b) in chain_a.iter().enumerate() {
            ops.put_header_async(block_record_from(h as u64, b))
                .await
                .unwrap();
        }

        let event = detect_reorg(&reader, &ops, 100, 6)
            .await
            .unwrap()
            .expect("must detect the fork");
        assert_eq!(event.from_height, 98);
        assert_eq!(event.to_height, 100);
    }

    #[tokio::test]
    async fn test_too_deep_reorg_is_an_error() {
        let chain_a = build_test_chain(50, 0);
        let chain_b = build_test_chain(50, 1);

        let reader = TestReader::new(chain_b);
        let ops = get_ops();
        for (h, b) in chain_a.iter().enumerate() {
            ops.put_header_async(block_record_from(h as u64, b))
                .await
                .unwrap();
        }

        let res = detect_reorg(&reader, &ops, 49, 6).await;
        assert!(res.is_err(), "fork beyond max depth cannot be recovered");
    }
}
