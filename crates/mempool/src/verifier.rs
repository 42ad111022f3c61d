//! Version-dispatched transaction verification.
//!
//! The first byte of the raw bytes selects a verifier; within a verifier,
//! the transaction (or the PSBT wrapping it) is decoded and classified
//! against the overlay templates.

use bitcoin::consensus::encode::deserialize;
use bitcoin::{Psbt, Transaction};
use tapnet_primitives::params::OverlayParams;
use tapnet_primitives::tx::TxKind;
use tapnet_tx_parser::{parse_overlay_tx, ParsedOverlay};

/// What admission learned about a submission.
#[derive(Clone, Debug)]
pub struct VerifiedTx {
    pub tx: Transaction,
    pub kind: TxKind,
    pub parsed: Option<ParsedOverlay>,

    /// False for PSBTs, which still need signatures elsewhere.
    pub finalized: bool,
}

/// Decodes and classifies a raw submission.  Errors are human-readable
/// reject reasons.
pub fn verify_submission(
    raw: &[u8],
    psbt: bool,
    params: &OverlayParams,
) -> Result<VerifiedTx, String> {
    if psbt {
        return verify_psbt(raw, params);
    }

    // Dispatch on the leading version byte of the serialized transaction.
    match raw.first() {
        Some(0x01) | Some(0x02) => verify_raw_tx(raw, params),
        Some(other) => Err(format!("unsupported transaction version byte {other:#04x}")),
        None => Err("empty transaction".to_string()),
    }
}

fn verify_raw_tx(raw: &[u8], params: &OverlayParams) -> Result<VerifiedTx, String> {
    let tx: Transaction =
        deserialize(raw).map_err(|e| format!("undecodable transaction: {e}"))?;
    if tx.input.is_empty() {
        return Err("transaction has no inputs".to_string());
    }
    if tx.output.is_empty() {
        return Err("transaction has no outputs".to_string());
    }

    let parsed = match parse_overlay_tx(&tx, 0, params) {
        Ok(parsed) => parsed,
        // A malformed overlay witness is a hard reject, not a generic tx.
        Err(e) => return Err(format!("malformed overlay payload: {e}")),
    };
    let kind = parsed
        .as_ref()
        .map(|p| p.payload.kind())
        .unwrap_or(TxKind::Generic);

    Ok(VerifiedTx {
        tx,
        kind,
        parsed,
        finalized: true,
    })
}

fn verify_psbt(raw: &[u8], params: &OverlayParams) -> Result<VerifiedTx, String> {
    let psbt = Psbt::deserialize(raw).map_err(|e| format!("undecodable psbt: {e}"))?;
    let tx = psbt.unsigned_tx.clone();
    if tx.input.is_empty() {
        return Err("psbt has no inputs".to_string());
    }

    // The unsigned tx has no witnesses yet, so overlay classification is
    // deferred to finalization; admission only checks decodability.
    let _ = params;
    Ok(VerifiedTx {
        tx,
        kind: TxKind::Generic,
        parsed: None,
        finalized: false,
    })
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::encode::serialize;
    use tapnet_primitives::params::regtest_params;
    use tapnet_tx_parser::test_utils::{build_overlay_tx, OverlayTxSpec};

    use super::*;

    #[test]
    fn test_overlay_tx_classified() {
        let params = regtest_params().overlay;
        let tx = build_overlay_tx(&OverlayTxSpec::interaction(vec![1, 2, 3]));
        let raw = serialize(&tx);

        let verified = verify_submission(&raw, false, &params).expect("should verify");
        assert_eq!(verified.kind, TxKind::Interaction);
        assert!(verified.finalized);
        assert!(verified.parsed.is_some());
    }

    #[test]
    fn test_garbage_rejected() {
        let params = regtest_params().overlay;
        let res = verify_submission(&[0x02, 0xff, 0xff], false, &params);
        assert!(res.is_err());
    }

    #[test]
    fn test_unknown_version_byte_rejected() {
        let params = regtest_params().overlay;
        let res = verify_submission(&[0x09, 0x00], false, &params);
        assert!(res.unwrap_err().contains("version byte"));
    }

    #[test]
    fn test_empty_rejected() {
        let params = regtest_params().overlay;
        assert!(verify_submission(&[], false, &params).is_err());
    }
}
