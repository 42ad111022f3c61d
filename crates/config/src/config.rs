use std::path::PathBuf;

use bitcoin::Network;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub datadir: PathBuf,
    pub db_retry_count: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitcoindConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,
    pub network: Network,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Blocks kept in flight ahead of the commit cursor.
    pub max_prefetch_blocks: usize,
    /// How deep we search for a reorg fork point before giving up.
    pub max_reorg_depth: u64,
    /// Chain tip poll interval.
    pub client_poll_dur_ms: u32,
    /// Refuse mempool submissions while not fully synced.
    pub prevent_broadcast_if_not_synced: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IbdConfig {
    pub enabled: bool,
    /// Distance behind the tip before bulk import kicks in.
    pub threshold: u64,
    pub header_batch_size: u64,
    pub worker_count: usize,
    pub checkpoint_interval: u64,
    /// Pull witnesses during bulk import too; default off.
    pub sync_witnesses: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MempoolConfig {
    /// Fee estimation refresh interval.
    pub fee_refresh_interval_secs: u64,
    /// Entries older than this many blocks get purged.
    pub expiration_blocks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct P2pConfig {
    pub listen_addr: String,
    pub peers: Vec<String>,
    /// Handshake deadline; peers that don't authenticate in time are cut.
    pub auth_timeout_secs: u64,
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WitnessConfig {
    /// Window half-width around the committed tip.
    pub pending_block_threshold: u64,
    /// GC sweep interval for stale tracked identities.
    pub gc_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    pub bitcoind_rpc: BitcoindConfig,
    pub sync: SyncConfig,
    pub ibd: IbdConfig,
    pub mempool: MempoolConfig,
    pub p2p: P2pConfig,
    pub witness: WitnessConfig,
}

#[cfg(test)]
mod test {
    use crate::config::Config;

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [client]
            rpc_host = "0.0.0.0"
            rpc_port = 9001
            datadir = "/path/to/data/directory"
            db_retry_count = 5

            [bitcoind_rpc]
            rpc_url = "http://localhost:18332"
            rpc_user = "tapnet"
            rpc_password = "tapnet"
            network = "regtest"

            [sync]
            max_prefetch_blocks = 8
            max_reorg_depth = 6
            client_poll_dur_ms = 200
            prevent_broadcast_if_not_synced = true

            [ibd]
            enabled = true
            threshold = 1000
            header_batch_size = 100
            worker_count = 8
            checkpoint_interval = 500
            sync_witnesses = false

            [mempool]
            fee_refresh_interval_secs = 30
            expiration_blocks = 20

            [p2p]
            listen_addr = "0.0.0.0:9735"
            peers = ["10.0.0.2:9735"]
            auth_timeout_secs = 10
            ping_interval_secs = 30

            [witness]
            pending_block_threshold = 10
            gc_interval_secs = 60
        "#;

        let config = toml::from_str::<Config>(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );
    }
}
