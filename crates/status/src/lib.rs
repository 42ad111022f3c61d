//! Shared status channels workers use to expose their view of the world
//! without coupling to each other.

use serde::Serialize;
use tokio::sync::watch;

/// Status of our connection to and view of the base chain.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChainStatus {
    /// Current base-chain tip height as last polled.
    pub cur_height: u64,

    /// Current base-chain tip hash, display form.
    pub cur_tip: String,

    /// Unix millis of the last successful poll.
    pub last_update: u64,

    pub rpc_connected: bool,

    pub last_rpc_error: Option<String>,
}

/// Where our own indexing stands.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncStatus {
    /// Highest committed block height.
    pub committed_height: u64,

    /// Height we're indexing towards.
    pub target_height: u64,

    /// Whether we consider ourselves caught up.
    pub synced: bool,

    /// Bulk import in progress.
    pub in_ibd: bool,

    /// Reorg recovery in progress; task scheduling is locked.
    pub in_reorg: bool,
}

/// Cheap-to-clone bundle of watch channels.
#[derive(Clone, Debug)]
pub struct StatusChannel {
    chain_tx: watch::Sender<ChainStatus>,
    chain_rx: watch::Receiver<ChainStatus>,
    sync_tx: watch::Sender<SyncStatus>,
    sync_rx: watch::Receiver<SyncStatus>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (chain_tx, chain_rx) = watch::channel(ChainStatus::default());
        let (sync_tx, sync_rx) = watch::channel(SyncStatus::default());
        Self {
            chain_tx,
            chain_rx,
            sync_tx,
            sync_rx,
        }
    }

    pub fn chain_status(&self) -> ChainStatus {
        self.chain_rx.borrow().clone()
    }

    pub fn update_chain_status(&self, status: ChainStatus) {
        let _ = self.chain_tx.send(status);
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_rx.borrow().clone()
    }

    pub fn update_sync_status(&self, status: SyncStatus) {
        let _ = self.sync_tx.send(status);
    }

    /// Convenience mutator for the sync side.
    pub fn modify_sync_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut cur = self.sync_status();
        f(&mut cur);
        self.update_sync_status(cur);
    }

    /// Subscribes to sync status changes, for workers that want to react to
    /// block-height movement rather than poll.
    pub fn subscribe_sync(&self) -> watch::Receiver<SyncStatus> {
        self.sync_rx.clone()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}
