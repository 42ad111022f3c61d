//! Overlay transaction operations.

use tapnet_primitives::buf::Buf32;
use tapnet_primitives::tx::TransactionRecord;

use crate::exec::inst_ops;

inst_ops! {
    (TxDataOps, tapnet_db::traits::TransactionDatabase) {
        put_block_txs(height: u64, txs: Vec<TransactionRecord>) => ();
        get_block_txs(height: u64) => Vec<TransactionRecord>;
        get_tx_by_id(txid: Buf32) => Option<TransactionRecord>;
        revert_to_height(new_tip: u64) => ();
    }
}
