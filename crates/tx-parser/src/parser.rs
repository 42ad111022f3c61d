//! Full overlay transaction decoding: template match, witness commitment
//! checks, contract address binding and variant extras.

use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, Transaction, XOnlyPublicKey};
use tapnet_primitives::buf::{Buf32, Buf33};
use tapnet_primitives::hash;
use tapnet_primitives::params::OverlayParams;
use tapnet_primitives::tx::{
    DeploymentData, InteractionData, TxPayload, UnwrapData, WrapData,
};
use tracing::trace;

use crate::calldata::decode_calldata;
use crate::errors::ParseError;
use crate::fees::split_wrap_fees;
use crate::template::{match_template, MatchedTemplate, TemplateKind};
use crate::utils::{derive_vault_address, p2tr_address};

/// Decoded overlay content of one base-chain transaction.
#[derive(Clone, Debug)]
pub struct ParsedOverlay {
    /// Sender p2tr address.
    pub from: String,

    /// Address of the output carrying the contract secret.
    pub contract_address: String,

    pub payload: TxPayload,
}

/// Attempts to decode the witness input at `input_index` as an overlay
/// interaction.  `Ok(None)` means the transaction is not an overlay tx.
pub fn parse_overlay_tx(
    tx: &Transaction,
    input_index: usize,
    params: &OverlayParams,
) -> Result<Option<ParsedOverlay>, ParseError> {
    let Some(input) = tx.input.get(input_index) else {
        return Ok(None);
    };
    let Some(script) = input.witness.tapscript() else {
        return Ok(None);
    };

    let Some(matched) = match_template(&script.into())? else {
        return Ok(None);
    };
    trace!(kind = ?matched.kind, "matched overlay template");

    // The witness stack fronts the script with the contract secret and the
    // sender key; both must hash to the commitments inside the script.
    let witness = &input.witness;
    let contract_secret = witness
        .nth(0)
        .ok_or(ParseError::MalformedWitness("missing contract secret"))?;
    let witness_sender_key = witness
        .nth(1)
        .ok_or(ParseError::MalformedWitness("missing sender key"))?;

    if hash::hash160(witness_sender_key) != matched.sender_pubkey_hash {
        return Err(ParseError::MalformedWitness("sender key hash mismatch"));
    }
    if witness_sender_key != matched.sender_pubkey.as_slice() {
        return Err(ParseError::MalformedWitness("sender key differs from script"));
    }
    if hash::hash160(contract_secret) != matched.contract_secret_hash {
        return Err(ParseError::MalformedWitness("contract secret hash mismatch"));
    }

    // The contract address is the output whose taproot program equals the
    // secret.
    let contract_address = locate_contract_output(tx, contract_secret, params.network)
        .ok_or(ParseError::MalformedWitness("no output carries the contract secret"))?;

    let sender_key = XOnlyPublicKey::from_slice(matched.sender_pubkey.as_slice())
        .map_err(|_| ParseError::MalformedWitness("sender key not a valid x-only key"))?;
    let from = p2tr_address(&sender_key, params.network).to_string();

    let (calldata, was_compressed) =
        decode_calldata(&matched.calldata, params.max_calldata_size)?;

    let interaction = InteractionData {
        sender_pubkey: matched.sender_pubkey,
        salt_pubkey: matched.salt_pubkey,
        sender_pubkey_hash: matched.sender_pubkey_hash,
        contract_secret_hash: matched.contract_secret_hash,
        calldata,
        was_compressed,
    };

    let payload = match matched.kind {
        TemplateKind::Interaction => TxPayload::Interaction(interaction),
        TemplateKind::Wrap => {
            let wrap = decode_wrap(tx, &matched, params.network)?;
            TxPayload::WrapInteraction(interaction, wrap)
        }
        TemplateKind::Unwrap => {
            let unwrap = decode_unwrap(&interaction)?;
            TxPayload::UnwrapInteraction(interaction, unwrap)
        }
        TemplateKind::Deployment => {
            let deployment = DeploymentData {
                bytecode: interaction.calldata.clone(),
                was_compressed: interaction.was_compressed,
            };
            TxPayload::Deployment(interaction, deployment)
        }
    };

    Ok(Some(ParsedOverlay {
        from,
        contract_address,
        payload,
    }))
}

/// Finds the output whose witness program data equals the contract secret
/// and renders its address.
fn locate_contract_output(
    tx: &Transaction,
    contract_secret: &[u8],
    network: Network,
) -> Option<String> {
    tx.output.iter().find_map(|out| {
        let script = &out.script_pubkey;
        if !script.is_p2tr() {
            return None;
        }
        // Skip the version byte and push opcode.
        let program = &script.as_bytes()[2..];
        if program == contract_secret {
            Address::from_script(script, network)
                .ok()
                .map(|a| a.to_string())
        } else {
            None
        }
    })
}

/// Wrap extras: unpack the vault key set, derive the vault address, find the
/// deposit output and split the fees.
fn decode_wrap(
    tx: &Transaction,
    matched: &MatchedTemplate,
    network: Network,
) -> Result<WrapData, ParseError> {
    let blob = matched
        .vault_keys_blob
        .as_ref()
        .ok_or(ParseError::MalformedWitness("wrap without vault keys"))?;
    if blob.is_empty() || blob.len() % 33 != 0 {
        return Err(ParseError::InvalidVaultKeys(format!(
            "key blob length {} not a multiple of 33",
            blob.len()
        )));
    }

    let vault_pubkeys: Vec<Buf33> = blob
        .chunks_exact(33)
        .map(|chunk| Buf33::try_from(chunk).expect("chunks_exact"))
        .collect();

    let minimum_signatures = matched
        .minimum_signatures
        .ok_or(ParseError::MalformedWitness("wrap without threshold"))?;
    if minimum_signatures == 0 || minimum_signatures as usize > vault_pubkeys.len() {
        return Err(ParseError::InvalidVaultKeys(format!(
            "threshold {minimum_signatures} out of range for {} keys",
            vault_pubkeys.len()
        )));
    }

    let (vault_address, _) = derive_vault_address(&vault_pubkeys, network)
        .map_err(|e| ParseError::InvalidVaultKeys(e.to_string()))?;

    let vault_spk = vault_address.script_pubkey();
    let deposit_amount: u64 = tx
        .output
        .iter()
        .filter(|out| out.script_pubkey == vault_spk)
        .map(|out| out.value.to_sat())
        .sum();
    if deposit_amount == 0 {
        return Err(ParseError::MalformedWitness("wrap without vault deposit"));
    }

    let fees = split_wrap_fees(deposit_amount);

    Ok(WrapData {
        vault_pubkeys,
        minimum_signatures,
        vault_address: vault_address.to_string(),
        deposit_amount,
        wrapping_fees: fees.total,
        validator_fee: fees.validator,
        stacking_fee: fees.stacking,
        treasury_fee: fees.treasury,
    })
}

/// Unwrap extras ride inside the calldata: an 8-byte amount then the target
/// script address bytes.
fn decode_unwrap(interaction: &InteractionData) -> Result<UnwrapData, ParseError> {
    let data = &interaction.calldata;
    if data.len() < 9 {
        return Err(ParseError::MalformedWitness("unwrap calldata too short"));
    }
    let amount = u64::from_le_bytes(data[..8].try_into().expect("unwrap: split"));
    let target_address = String::from_utf8(data[8..].to_vec())
        .map_err(|_| ParseError::MalformedWitness("unwrap target not utf8"))?;
    Ok(UnwrapData {
        amount,
        target_address,
    })
}

/// Computes the burned value of an overlay tx: inputs we can't see minus
/// declared outputs is not computable here, so burned value is the sum of
/// provably-unspendable outputs.
pub fn compute_burned_value(tx: &Transaction) -> u64 {
    tx.output
        .iter()
        .filter(|out| out.script_pubkey.is_op_return())
        .map(|out| out.value.to_sat())
        .sum()
}

/// Sha256d txid of the transaction as a Buf32.
pub fn txid_buf(tx: &Transaction) -> Buf32 {
    Buf32::from(tx.compute_txid().to_byte_array())
}

#[cfg(test)]
mod tests {
    use tapnet_primitives::constants::MAX_CALLDATA_SIZE_DECOMPRESSED;
    use tapnet_primitives::params::regtest_params;

    use super::*;
    use crate::template::TemplateKind;
    use crate::test_utils::{build_overlay_tx, OverlayTxSpec};

    fn params() -> OverlayParams {
        regtest_params().overlay
    }

    #[test]
    fn test_interaction_roundtrip() {
        let spec = OverlayTxSpec::interaction(b"calldata bytes".to_vec());
        let tx = build_overlay_tx(&spec);

        let parsed = parse_overlay_tx(&tx, 0, &params())
            .unwrap()
            .expect("should parse");

        let TxPayload::Interaction(data) = &parsed.payload else {
            panic!("wrong variant");
        };
        assert_eq!(data.calldata, b"calldata bytes");
        assert!(!data.was_compressed);
        assert!(parsed.from.starts_with("bcrt1p"), "regtest p2tr address");
        assert!(parsed.contract_address.starts_with("bcrt1p"));
    }

    #[test]
    fn test_non_overlay_tx_is_none() {
        let spec = OverlayTxSpec::interaction(vec![1, 2, 3]);
        let mut tx = build_overlay_tx(&spec);
        // Strip the witness; now it's just a plain spend.
        tx.input[0].witness = bitcoin::Witness::new();
        assert!(parse_overlay_tx(&tx, 0, &params()).unwrap().is_none());
    }

    #[test]
    fn test_tampered_secret_rejected() {
        let mut spec = OverlayTxSpec::interaction(vec![1, 2, 3]);
        spec.tamper_contract_secret = true;
        let tx = build_overlay_tx(&spec);

        let res = parse_overlay_tx(&tx, 0, &params());
        assert!(
            matches!(res, Err(ParseError::MalformedWitness(_))),
            "hash mismatch must be malformed, got {res:?}"
        );
    }

    #[test]
    fn test_missing_contract_output_rejected() {
        let mut spec = OverlayTxSpec::interaction(vec![1, 2, 3]);
        spec.omit_contract_output = true;
        let tx = build_overlay_tx(&spec);

        let res = parse_overlay_tx(&tx, 0, &params());
        assert!(matches!(res, Err(ParseError::MalformedWitness(_))));
    }

    #[test]
    fn test_oversized_calldata_hits_limit() {
        let spec =
            OverlayTxSpec::interaction(vec![0xee; MAX_CALLDATA_SIZE_DECOMPRESSED + 1]);
        let tx = build_overlay_tx(&spec);

        let res = parse_overlay_tx(&tx, 0, &params());
        assert!(
            matches!(res, Err(ParseError::CalldataLimit { .. })),
            "over-limit calldata must be rejected, got {res:?}"
        );
    }

    #[test]
    fn test_wrap_deposit_and_fees() {
        let spec = OverlayTxSpec::wrap(3, 2, 1_000_000);
        let tx = build_overlay_tx(&spec);

        let parsed = parse_overlay_tx(&tx, 0, &params())
            .unwrap()
            .expect("should parse");
        let TxPayload::WrapInteraction(_, wrap) = &parsed.payload else {
            panic!("wrong variant");
        };

        assert_eq!(wrap.vault_pubkeys.len(), 3);
        assert_eq!(wrap.minimum_signatures, 2);
        assert_eq!(wrap.deposit_amount, 1_000_000);
        assert_eq!(wrap.wrapping_fees, 1_000_000 * 30 / 10_000 + 1);
        assert_eq!(
            wrap.validator_fee + wrap.stacking_fee + wrap.treasury_fee,
            wrap.wrapping_fees
        );
    }

    #[test]
    fn test_deployment_carries_bytecode() {
        let mut spec = OverlayTxSpec::interaction(vec![0x60, 0x0a, 0x61]);
        spec.kind = TemplateKind::Deployment;
        let tx = build_overlay_tx(&spec);

        let parsed = parse_overlay_tx(&tx, 0, &params())
            .unwrap()
            .expect("should parse");
        let TxPayload::Deployment(_, deployment) = &parsed.payload else {
            panic!("wrong variant");
        };
        assert_eq!(deployment.bytecode, vec![0x60, 0x0a, 0x61]);
    }
}
