//! Global consensus parameters for the overlay network.

use bitcoin::Network;

use crate::buf::Buf32;
use crate::constants;

/// Consensus parameters that don't change for the lifetime of the network
/// (unless there's some weird hard fork).
#[derive(Clone, Debug)]
pub struct OverlayParams {
    /// Bitcoin network the overlay rides on.
    pub network: Network,

    /// Height at which the overlay activates; heights below it carry no
    /// overlay state.
    pub activation_height: Option<u64>,

    /// Height below which transaction bodies are not indexed at all.
    pub start_indexing_utxos_at: u64,

    /// Blocks per epoch.
    pub blocks_per_epoch: u64,

    /// Decompressed calldata cap per transaction.
    pub max_calldata_size: usize,

    /// Pre-published trusted witness authority keys.
    pub trusted_keys: Vec<Buf32>,

    /// Minimum trusted attestations for a block to count as witnessed.
    pub min_trusted_witnesses: usize,
}

impl OverlayParams {
    /// Returns whether the overlay executes anything at the given height.
    pub fn is_active_at(&self, height: u64) -> bool {
        match self.activation_height {
            Some(h) => height >= h,
            None => true,
        }
    }
}

/// Client-local parameters that are used to make the node work but don't
/// strictly have to be pre-agreed across the network.
#[derive(Clone, Debug)]
pub struct RunParams {
    /// Number of blocks kept in flight ahead of the commit cursor.
    pub max_prefetch_blocks: usize,

    /// Depth we're willing to search backwards for a reorg fork point.
    pub max_reorg_depth: u64,

    /// Refuse mempool submissions while we're still syncing.
    pub prevent_broadcast_if_not_synced: bool,

    /// Witness window half-width around the committed tip.
    pub pending_block_threshold: u64,
}

/// Combined set of parameters across all the node workers.
#[derive(Clone, Debug)]
pub struct Params {
    pub overlay: OverlayParams,
    pub run: RunParams,
}

impl Params {
    pub fn overlay(&self) -> &OverlayParams {
        &self.overlay
    }

    pub fn run(&self) -> &RunParams {
        &self.run
    }
}

/// Reasonable defaults for a regtest instance, mostly for tests.
pub fn regtest_params() -> Params {
    Params {
        overlay: OverlayParams {
            network: Network::Regtest,
            activation_height: None,
            start_indexing_utxos_at: 0,
            blocks_per_epoch: constants::BLOCKS_PER_EPOCH,
            max_calldata_size: constants::MAX_CALLDATA_SIZE_DECOMPRESSED,
            trusted_keys: Vec::new(),
            min_trusted_witnesses: 1,
        },
        run: RunParams {
            max_prefetch_blocks: constants::MAX_PREFETCH_BLOCKS,
            max_reorg_depth: 6,
            prevent_broadcast_if_not_synced: false,
            pending_block_threshold: constants::PENDING_BLOCK_THRESHOLD,
        },
    }
}
