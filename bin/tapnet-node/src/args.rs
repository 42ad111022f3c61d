use std::path::PathBuf;

use argh::FromArgs;
use tapnet_config::Config;

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Tapnet overlay node")]
pub struct Args {
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,

    // Config overriding args
    #[argh(
        option,
        short = 'd',
        description = "datadir path that will contain databases"
    )]
    pub datadir: Option<PathBuf>,

    #[argh(option, description = "rpc host")]
    pub rpc_host: Option<String>,

    #[argh(option, description = "rpc port")]
    pub rpc_port: Option<u16>,
}

impl Args {
    /// Applies CLI overrides on top of the loaded config.
    pub fn override_config(&self, config: &mut Config) -> bool {
        let mut overridden = false;

        if let Some(datadir) = &self.datadir {
            config.client.datadir = datadir.into();
            overridden = true;
        }
        if let Some(rpc_host) = &self.rpc_host {
            config.client.rpc_host = rpc_host.to_string();
            overridden = true;
        }
        if let Some(rpc_port) = &self.rpc_port {
            config.client.rpc_port = *rpc_port;
            overridden = true;
        }
        overridden
    }
}
