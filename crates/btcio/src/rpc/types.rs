use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct RpcBlockchainInfo {
    /// Number of blocks in the longest chain.
    pub blocks: u64,

    /// Hash of the best block, hex.
    pub bestblockhash: String,

    pub chain: String,

    #[serde(default)]
    pub initialblockdownload: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcBlockHeader {
    pub hash: String,
    pub height: u64,
    pub previousblockhash: Option<String>,
    pub merkleroot: String,
    pub time: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcMempoolInfo {
    /// Number of transactions currently queued.
    pub size: u64,

    /// Sum of virtual sizes, bytes.
    pub bytes: u64,

    /// Total memory usage, bytes.
    pub usage: u64,

    /// Minimum fee rate in BTC/kvB for acceptance.
    pub mempoolminfee: f64,

    /// Configured minimum relay fee, BTC/kvB.
    pub minrelaytxfee: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcEstimateSmartFee {
    /// Estimated fee rate in BTC/kvB, absent when the node has no estimate.
    pub feerate: Option<f64>,

    #[serde(default)]
    pub errors: Vec<String>,

    pub blocks: u64,
}

/// Converts a BTC/kvB fee rate into sat/vB, rounding up.
pub fn btc_per_kvb_to_sat_per_vb(rate: f64) -> u64 {
    ((rate * 100_000_000.0) / 1000.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rate_conversion() {
        // 0.00001 BTC/kvB == 1 sat/vB
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.00001), 1);
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.0002), 20);
        // Fractions round up.
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.000015), 2);
    }
}
