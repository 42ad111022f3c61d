//! Opcode template matching for overlay tapscripts.
//!
//! The script shape shared by all interaction variants:
//!
//! ```text
//! <senderPubKey> OP_CHECKSIGVERIFY
//! <saltPubKey>   OP_CHECKSIGVERIFY
//! OP_HASH160 <senderPubKeyHash160>   OP_EQUALVERIFY
//! OP_HASH160 <contractSecretHash160> OP_EQUALVERIFY
//! OP_DEPTH OP_1 OP_NUMEQUAL
//! OP_IF
//!   <variant marker> [variant extras] <calldata chunks...>
//! OP_ELSE
//!   OP_1
//! OP_ENDIF
//! ```
//!
//! The marker sequence ending in OP_1NEGATE selects the variant.

use bitcoin::opcodes::all::{
    OP_CHECKSIGVERIFY, OP_DEPTH, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_HASH160, OP_IF,
    OP_NUMEQUAL, OP_PUSHNUM_1, OP_PUSHNUM_16, OP_PUSHNUM_2,
};
use bitcoin::script::{Instruction, Instructions};
use bitcoin::ScriptBuf;
use tapnet_primitives::buf::{Buf20, Buf32};

use crate::errors::ParseError;
use crate::utils::{next_bytes, next_op};

/// Which overlay template the tail marker selected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TemplateKind {
    Interaction,
    Wrap,
    Unwrap,
    Deployment,
}

/// Raw fields pulled out of a matched script, before witness checks.
#[derive(Clone, Debug)]
pub struct MatchedTemplate {
    pub kind: TemplateKind,
    pub sender_pubkey: Buf32,
    pub salt_pubkey: Buf32,
    pub sender_pubkey_hash: Buf20,
    pub contract_secret_hash: Buf20,

    /// Wrap only: the packed vault key blob.
    pub vault_keys_blob: Option<Vec<u8>>,

    /// Wrap only: multisig threshold.
    pub minimum_signatures: Option<u32>,

    /// Concatenated calldata chunks, still possibly compressed.
    pub calldata: Vec<u8>,
}

/// Tries to match the overlay template.  `Ok(None)` means "not an overlay
/// script", which the pipeline treats as a generic transaction.
pub fn match_template(script: &ScriptBuf) -> Result<Option<MatchedTemplate>, ParseError> {
    let mut instructions = script.instructions();

    // Common prefix.  Any mismatch up to (and including) the variant marker
    // means this is somebody else's script.
    let Some(sender_pubkey) = next_bytes(&mut instructions).and_then(buf32) else {
        return Ok(None);
    };
    if next_op(&mut instructions) != Some(OP_CHECKSIGVERIFY) {
        return Ok(None);
    }
    let Some(salt_pubkey) = next_bytes(&mut instructions).and_then(buf32) else {
        return Ok(None);
    };
    if next_op(&mut instructions) != Some(OP_CHECKSIGVERIFY) {
        return Ok(None);
    }

    if next_op(&mut instructions) != Some(OP_HASH160) {
        return Ok(None);
    }
    let Some(sender_pubkey_hash) = next_bytes(&mut instructions).and_then(buf20) else {
        return Ok(None);
    };
    if next_op(&mut instructions) != Some(OP_EQUALVERIFY) {
        return Ok(None);
    }

    if next_op(&mut instructions) != Some(OP_HASH160) {
        return Ok(None);
    }
    let Some(contract_secret_hash) = next_bytes(&mut instructions).and_then(buf20) else {
        return Ok(None);
    };
    if next_op(&mut instructions) != Some(OP_EQUALVERIFY) {
        return Ok(None);
    }

    if next_op(&mut instructions) != Some(OP_DEPTH) {
        return Ok(None);
    }
    if next_op(&mut instructions) != Some(OP_PUSHNUM_1) {
        return Ok(None);
    }
    if next_op(&mut instructions) != Some(OP_NUMEQUAL) {
        return Ok(None);
    }
    if next_op(&mut instructions) != Some(OP_IF) {
        return Ok(None);
    }

    let Some(kind) = match_marker(&mut instructions) else {
        return Ok(None);
    };

    // From here on the script claimed to be ours, so shape problems are
    // malformed-witness errors rather than "not overlay".
    let mut vault_keys_blob = None;
    let mut minimum_signatures = None;
    if kind == TemplateKind::Wrap {
        let blob = next_bytes(&mut instructions)
            .ok_or(ParseError::MalformedWitness("missing vault key blob"))?;
        vault_keys_blob = Some(blob.to_vec());
        minimum_signatures = Some(
            crate::utils::next_small_int(&mut instructions)
                .ok_or(ParseError::MalformedWitness("missing signature threshold"))?,
        );
    }

    let calldata = collect_calldata(&mut instructions)?;

    Ok(Some(MatchedTemplate {
        kind,
        sender_pubkey,
        salt_pubkey,
        sender_pubkey_hash,
        contract_secret_hash,
        vault_keys_blob,
        minimum_signatures,
        calldata,
    }))
}

/// Reads the marker sequence after OP_IF.  Markers are one or two leading
/// tokens terminated by OP_1NEGATE:
///
/// - `OP_1NEGATE`: plain interaction
/// - `OP_16 OP_1NEGATE`: wrap
/// - `OP_0 OP_1 OP_1NEGATE`: unwrap
/// - `OP_2 OP_1NEGATE`: deployment
fn match_marker(instructions: &mut Instructions<'_>) -> Option<TemplateKind> {
    use bitcoin::opcodes::all::OP_PUSHNUM_NEG1;

    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_PUSHNUM_NEG1 => Some(TemplateKind::Interaction),
        Some(Ok(Instruction::Op(op))) if op == OP_PUSHNUM_16 => {
            (next_op(instructions) == Some(OP_PUSHNUM_NEG1)).then_some(TemplateKind::Wrap)
        }
        Some(Ok(Instruction::Op(op))) if op == OP_PUSHNUM_2 => {
            (next_op(instructions) == Some(OP_PUSHNUM_NEG1)).then_some(TemplateKind::Deployment)
        }
        // OP_0 disassembles as an empty push.
        Some(Ok(Instruction::PushBytes(bytes))) if bytes.is_empty() => {
            (next_op(instructions) == Some(OP_PUSHNUM_1)
                && next_op(instructions) == Some(OP_PUSHNUM_NEG1))
            .then_some(TemplateKind::Unwrap)
        }
        _ => None,
    }
}

/// Concatenates the pushed calldata chunks up to OP_ELSE, then checks the
/// closing `OP_1 OP_ENDIF`.
fn collect_calldata(instructions: &mut Instructions<'_>) -> Result<Vec<u8>, ParseError> {
    let mut calldata = Vec::new();
    loop {
        match instructions.next() {
            Some(Ok(Instruction::PushBytes(bytes))) => {
                calldata.extend_from_slice(bytes.as_bytes());
            }
            Some(Ok(Instruction::Op(op))) if op == OP_ELSE => break,
            _ => return Err(ParseError::MalformedWitness("unterminated calldata block")),
        }
    }

    if next_op(instructions) != Some(OP_PUSHNUM_1) {
        return Err(ParseError::MalformedWitness("missing else-branch constant"));
    }
    if next_op(instructions) != Some(OP_ENDIF) {
        return Err(ParseError::MalformedWitness("missing OP_ENDIF"));
    }
    Ok(calldata)
}

fn buf32(bytes: &[u8]) -> Option<Buf32> {
    Buf32::try_from(bytes).ok()
}

fn buf20(bytes: &[u8]) -> Option<Buf20> {
    Buf20::try_from(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_overlay_script, OverlayScriptParts};

    fn parts() -> OverlayScriptParts {
        OverlayScriptParts {
            sender_pubkey: [1; 32],
            salt_pubkey: [2; 32],
            sender_pubkey_hash: [3; 20],
            contract_secret_hash: [4; 20],
            kind: TemplateKind::Interaction,
            vault_keys_blob: None,
            minimum_signatures: None,
            calldata: b"abc".to_vec(),
        }
    }

    #[test]
    fn test_interaction_template_roundtrip() {
        let script = build_overlay_script(&parts());
        let matched = match_template(&script).unwrap().expect("should match");
        assert_eq!(matched.kind, TemplateKind::Interaction);
        assert_eq!(matched.sender_pubkey, Buf32::from([1; 32]));
        assert_eq!(matched.calldata, b"abc");
    }

    #[test]
    fn test_wrap_marker() {
        let mut p = parts();
        p.kind = TemplateKind::Wrap;
        p.vault_keys_blob = Some(vec![9; 66]);
        p.minimum_signatures = Some(2);
        let script = build_overlay_script(&p);
        let matched = match_template(&script).unwrap().expect("should match");
        assert_eq!(matched.kind, TemplateKind::Wrap);
        assert_eq!(matched.vault_keys_blob.as_deref(), Some(&[9u8; 66][..]));
        assert_eq!(matched.minimum_signatures, Some(2));
    }

    #[test]
    fn test_unwrap_and_deployment_markers() {
        for kind in [TemplateKind::Unwrap, TemplateKind::Deployment] {
            let mut p = parts();
            p.kind = kind;
            let script = build_overlay_script(&p);
            let matched = match_template(&script).unwrap().expect("should match");
            assert_eq!(matched.kind, kind);
        }
    }

    #[test]
    fn test_foreign_script_is_not_overlay() {
        let script = bitcoin::blockdata::script::Builder::new()
            .push_slice([1u8; 32])
            .push_opcode(bitcoin::opcodes::all::OP_CHECKSIG)
            .into_script();
        assert!(match_template(&script).unwrap().is_none());
    }

    #[test]
    fn test_multi_chunk_calldata_concatenates() {
        let mut p = parts();
        p.calldata = vec![0xab; 1200];
        let script = build_overlay_script(&p);
        let matched = match_template(&script).unwrap().expect("should match");
        assert_eq!(matched.calldata.len(), 1200, "chunks must concatenate");
    }
}
