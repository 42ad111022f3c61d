//! Block data operations.

use tapnet_primitives::block::BlockRecord;
use tapnet_primitives::buf::Buf32;

use crate::exec::inst_ops;

inst_ops! {
    (BlockDataOps, tapnet_db::traits::BlockDatabase) {
        put_block(block: BlockRecord) => ();
        put_header(block: BlockRecord) => ();
        set_block_checksum(height: u64, root: Buf32, proofs: Vec<Vec<u8>>) => ();
        revert_to_height(new_tip: u64) => ();
        get_chain_tip() => Option<u64>;
        get_block_at(height: u64) => Option<BlockRecord>;
        get_block_range(start: u64, end: u64) => Vec<BlockRecord>;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tapnet_db::traits::NodeDatabase;
    use tapnet_primitives::test_utils::ArbitraryGenerator;
    use tapnet_rocksdb::test_utils::get_common_db;

    use super::*;

    fn get_ops() -> BlockDataOps {
        let pool = threadpool::Builder::new().num_threads(2).build();
        let db = get_common_db();
        Context::new(db.block_db().clone()).into_ops(pool)
    }

    fn gen_block_at(height: u64) -> BlockRecord {
        let b: BlockRecord = ArbitraryGenerator::new().generate();
        BlockRecord::new(
            height,
            *b.block_hash(),
            *b.prev_hash(),
            *b.merkle_root(),
            *b.receipt_root(),
            *b.storage_root(),
            *b.checksum_root(),
            vec![],
            b.tx_count(),
            b.raw_header().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_async_roundtrip_through_pool() {
        let ops = Arc::new(get_ops());
        ops.put_header_async(gen_block_at(3)).await.unwrap();
        let got = ops.get_block_at_async(3).await.unwrap();
        assert!(got.is_some(), "block written through pool must be readable");
        assert_eq!(ops.get_chain_tip_async().await.unwrap(), Some(3));
    }
}
