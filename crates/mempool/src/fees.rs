//! Fee oracle: smart-fee estimate banded by mempool occupancy.

use tapnet_btcio::rpc::types::{
    btc_per_kvb_to_sat_per_vb, RpcEstimateSmartFee, RpcMempoolInfo,
};
use tapnet_btcio::MempoolRpc;
use tapnet_rpc_types::MempoolFees;
use tracing::*;

/// Confirmation target for the smart-fee query.
const CONF_TARGET: u16 = 2;

/// Floor when both the estimator and the relay fee are silent.
const FALLBACK_SAT_PER_VB: u64 = 1;

/// Occupancy bands (bytes in the base-chain mempool) and the fee multiplier
/// they apply, in percent.
const OCCUPANCY_BANDS: &[(u64, u64)] = &[
    (1_000_000, 100),
    (10_000_000, 120),
    (50_000_000, 150),
    (u64::MAX, 200),
];

/// Derives the served fee tiers from raw estimator responses.
pub fn derive_fees(estimate: &RpcEstimateSmartFee, info: &RpcMempoolInfo) -> MempoolFees {
    let min_relay = btc_per_kvb_to_sat_per_vb(info.minrelaytxfee);
    let base = estimate
        .feerate
        .map(btc_per_kvb_to_sat_per_vb)
        .unwrap_or(min_relay)
        .max(min_relay)
        .max(FALLBACK_SAT_PER_VB);

    let multiplier = OCCUPANCY_BANDS
        .iter()
        .find(|(cap, _)| info.bytes < *cap)
        .map(|(_, m)| *m)
        .unwrap_or(200);

    let low = base;
    let medium = (base * multiplier).div_ceil(100);
    let high = (medium * 150).div_ceil(100);
    let conservative = (high * 125).div_ceil(100);

    MempoolFees {
        conservative,
        low,
        medium,
        high,
    }
}

/// Polls the base chain and derives the current tiers.  Failures fall back
/// to the floor so clients always get an answer.
pub async fn refresh_fees(client: &impl MempoolRpc) -> MempoolFees {
    let estimate = client.estimate_smart_fee(CONF_TARGET).await;
    let info = client.get_mempool_info().await;

    match (estimate, info) {
        (Ok(estimate), Ok(info)) => derive_fees(&estimate, &info),
        (est, inf) => {
            if let Err(e) = &est {
                warn!(err = %e, "estimatesmartfee failed");
            }
            if let Err(e) = &inf {
                warn!(err = %e, "getmempoolinfo failed");
            }
            MempoolFees {
                conservative: 2,
                low: FALLBACK_SAT_PER_VB,
                medium: FALLBACK_SAT_PER_VB,
                high: 2,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(bytes: u64) -> RpcMempoolInfo {
        RpcMempoolInfo {
            size: 100,
            bytes,
            usage: bytes,
            mempoolminfee: 0.00001,
            minrelaytxfee: 0.00001,
        }
    }

    fn estimate(feerate_btc_kvb: Option<f64>) -> RpcEstimateSmartFee {
        RpcEstimateSmartFee {
            feerate: feerate_btc_kvb,
            errors: vec![],
            blocks: 2,
        }
    }

    #[test]
    fn test_quiet_mempool_keeps_base_rate() {
        let fees = derive_fees(&estimate(Some(0.0001)), &info(500_000));
        assert_eq!(fees.low, 10);
        assert_eq!(fees.medium, 10, "band 100% leaves medium at base");
        assert!(fees.high > fees.medium);
        assert!(fees.conservative > fees.high);
    }

    #[test]
    fn test_busy_mempool_scales_up() {
        let quiet = derive_fees(&estimate(Some(0.0001)), &info(500_000));
        let busy = derive_fees(&estimate(Some(0.0001)), &info(60_000_000));
        assert!(busy.medium > quiet.medium);
        assert_eq!(busy.medium, 20, "top band doubles the base");
    }

    #[test]
    fn test_missing_estimate_falls_back_to_relay_fee() {
        let fees = derive_fees(&estimate(None), &info(1000));
        assert_eq!(fees.low, 1, "1 sat/vB relay floor");
    }

    #[test]
    fn test_tiers_are_monotonic() {
        for bytes in [0u64, 2_000_000, 20_000_000, 100_000_000] {
            let fees = derive_fees(&estimate(Some(0.0005)), &info(bytes));
            assert!(fees.low <= fees.medium);
            assert!(fees.medium <= fees.high);
            assert!(fees.high <= fees.conservative);
        }
    }
}
