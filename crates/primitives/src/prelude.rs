// Reexports from elsewhere in the crate.
pub use crate::block::{BlockRecord, ReorgRecord};
pub use crate::buf::{Buf20, Buf32, Buf33, Buf64};
pub use crate::epoch::{EpochRecord, EpochSubmission};
pub use crate::params::Params;
pub use crate::tx::{TransactionRecord, TxKind, TxPayload};
pub use crate::witness::BlockWitness;
