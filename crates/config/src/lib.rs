pub mod config;

pub use config::{
    BitcoindConfig, ClientConfig, Config, IbdConfig, MempoolConfig, P2pConfig, SyncConfig,
    WitnessConfig,
};
