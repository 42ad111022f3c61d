//! Mempool worker: admission, base-chain forwarding, conflict eviction and
//! the fee oracle.

pub mod errors;
pub mod fees;
pub mod verifier;
pub mod worker;

pub use errors::MempoolError;
pub use worker::{start_mempool_worker, MempoolHandle};
