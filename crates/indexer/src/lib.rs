//! Chain progression: block fetch/parse/commit pipeline, reorg recovery,
//! bulk import and epoch finalization.

pub mod epochs;
pub mod errors;
pub mod gate;
pub mod handle;
pub mod ibd;
pub mod messages;
pub mod parse_pool;
pub mod task;
pub mod vm;
pub mod watchdog;
pub mod worker;

pub use errors::IndexerError;
pub use handle::IndexerHandle;
pub use messages::ChainEvent;
