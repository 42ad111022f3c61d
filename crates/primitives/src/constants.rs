//! Consensus constants that don't change for the lifetime of the network.

/// Number of consecutive blocks grouped into one epoch.
pub const BLOCKS_PER_EPOCH: u64 = 5;

/// Hard cap on decompressed calldata carried by one overlay transaction.
pub const MAX_CALLDATA_SIZE_DECOMPRESSED: usize = 1024 * 1024;

/// Wrapping fee numerator, applied over [`WRAP_FEE_BASE`].
pub const WRAP_PERCENTAGE_FEE: u64 = 30;

/// Wrapping fee denominator.
pub const WRAP_FEE_BASE: u64 = 10_000;

/// Minimum sats a wrap deposit must carry to be considered at all.
pub const MINIMUM_WRAP_DEPOSIT: u64 = 330;

/// How far behind the chain tip we have to be before bulk import kicks in.
pub const IBD_THRESHOLD: u64 = 1_000;

/// Headers fetched per batch during bulk import.
pub const HEADER_BATCH_SIZE: u64 = 100;

/// Parallel fetch workers used by the bulk import phases.
pub const IBD_WORKER_COUNT: usize = 8;

/// Committed items between two checkpoint writes within an IBD phase.
pub const CHECKPOINT_INTERVAL: u64 = 500;

/// Blocks on each side of the committed tip for which we track witnesses.
pub const PENDING_BLOCK_THRESHOLD: u64 = 10;

/// Cap on queued not-yet-verifiable witness packets per future block.
pub const MAX_PENDING_WITNESSES: usize = 50;

/// Default number of blocks kept in flight ahead of the commit cursor.
pub const MAX_PREFETCH_BLOCKS: usize = 8;

/// Maximum accepted size for a raw mempool transaction, in bytes.
pub const MEMPOOL_MAX_TX_SIZE: usize = 400 * 1024;

/// Maximum accepted size for a PSBT submission, in bytes.
pub const MEMPOOL_MAX_PSBT_SIZE: usize = 1024 * 1024;

/// Mempool entries older than this many blocks are purged by the age sweep.
pub const MEMPOOL_EXPIRATION_BLOCKS: u64 = 20;

/// Sentinel end block for an epoch still being built.
pub const EPOCH_ACTIVE_SENTINEL: u64 = u64::MAX;
