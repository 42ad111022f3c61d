//! Post-quantum key registry operations.

use tapnet_db::types::MldsaKeyEntry;
use tapnet_primitives::buf::Buf32;

use crate::exec::inst_ops;

inst_ops! {
    (PublicKeyOps, tapnet_db::traits::PublicKeyDatabase) {
        put_key(entry: MldsaKeyEntry) => ();
        get_key(key_hash: Buf32) => Option<MldsaKeyEntry>;
        revert_to_height(new_tip: u64) => ();
    }
}
