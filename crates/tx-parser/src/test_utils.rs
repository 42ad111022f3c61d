//! Builders that produce syntactically-valid overlay scripts and
//! transactions for tests.

use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::opcodes::all::{
    OP_CHECKSIGVERIFY, OP_DEPTH, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_HASH160, OP_IF,
    OP_NUMEQUAL, OP_PUSHNUM_1, OP_PUSHNUM_16, OP_PUSHNUM_2, OP_PUSHNUM_NEG1,
};
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    WitnessProgram, WitnessVersion,
};
use tapnet_primitives::buf::Buf33;
use tapnet_primitives::hash;

use crate::template::TemplateKind;
use crate::utils::derive_vault_address;

const SCRIPT_PUSH_LIMIT: usize = 520;

/// Raw script fields; the low-level knob set used by template tests.
pub struct OverlayScriptParts {
    pub sender_pubkey: [u8; 32],
    pub salt_pubkey: [u8; 32],
    pub sender_pubkey_hash: [u8; 20],
    pub contract_secret_hash: [u8; 20],
    pub kind: TemplateKind,
    pub vault_keys_blob: Option<Vec<u8>>,
    pub minimum_signatures: Option<u32>,
    pub calldata: Vec<u8>,
}

/// Assembles the overlay tapscript from its parts.
pub fn build_overlay_script(parts: &OverlayScriptParts) -> ScriptBuf {
    let mut builder = Builder::new()
        .push_slice(parts.sender_pubkey)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_slice(parts.salt_pubkey)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_opcode(OP_HASH160)
        .push_slice(parts.sender_pubkey_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_HASH160)
        .push_slice(parts.contract_secret_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DEPTH)
        .push_opcode(OP_PUSHNUM_1)
        .push_opcode(OP_NUMEQUAL)
        .push_opcode(OP_IF);

    builder = match parts.kind {
        TemplateKind::Interaction => builder.push_opcode(OP_PUSHNUM_NEG1),
        TemplateKind::Wrap => builder
            .push_opcode(OP_PUSHNUM_16)
            .push_opcode(OP_PUSHNUM_NEG1),
        TemplateKind::Unwrap => builder
            .push_slice([])
            .push_opcode(OP_PUSHNUM_1)
            .push_opcode(OP_PUSHNUM_NEG1),
        TemplateKind::Deployment => builder
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_PUSHNUM_NEG1),
    };

    if parts.kind == TemplateKind::Wrap {
        let blob = parts.vault_keys_blob.clone().unwrap_or_default();
        builder = builder.push_slice(to_push(&blob));
        builder = builder.push_int(parts.minimum_signatures.unwrap_or(1) as i64);
    }

    for chunk in parts.calldata.chunks(SCRIPT_PUSH_LIMIT) {
        builder = builder.push_slice(to_push(chunk));
    }
    if parts.calldata.is_empty() {
        builder = builder.push_slice([]);
    }

    builder
        .push_opcode(OP_ELSE)
        .push_opcode(OP_PUSHNUM_1)
        .push_opcode(OP_ENDIF)
        .into_script()
}

fn to_push(data: &[u8]) -> PushBytesBuf {
    PushBytesBuf::try_from(data.to_vec()).expect("test: push size")
}

/// Higher-level spec for building a whole overlay transaction.
pub struct OverlayTxSpec {
    pub kind: TemplateKind,
    pub calldata: Vec<u8>,
    pub vault_keys: Vec<Buf33>,
    pub minimum_signatures: u32,
    pub deposit: u64,
    pub tamper_contract_secret: bool,
    pub omit_contract_output: bool,
}

impl OverlayTxSpec {
    pub fn interaction(calldata: Vec<u8>) -> Self {
        Self {
            kind: TemplateKind::Interaction,
            calldata,
            vault_keys: vec![],
            minimum_signatures: 0,
            deposit: 0,
            tamper_contract_secret: false,
            omit_contract_output: false,
        }
    }

    pub fn wrap(n_keys: usize, threshold: u32, deposit: u64) -> Self {
        let secp = Secp256k1::new();
        let vault_keys = (0..n_keys)
            .map(|i| {
                let sk = SecretKey::from_slice(&[50 + i as u8; 32]).expect("test: vault sk");
                Buf33::try_from(sk.public_key(&secp).serialize().as_slice())
                    .expect("test: compressed key")
            })
            .collect();
        Self {
            kind: TemplateKind::Wrap,
            calldata: b"wrap".to_vec(),
            vault_keys,
            minimum_signatures: threshold,
            deposit,
            tamper_contract_secret: false,
            omit_contract_output: false,
        }
    }
}

fn sender_keypair() -> Keypair {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[42; 32]).expect("test: sender sk");
    Keypair::from_secret_key(&secp, &sk)
}

fn contract_secret() -> [u8; 32] {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[43; 32]).expect("test: secret sk");
    Keypair::from_secret_key(&secp, &sk)
        .x_only_public_key()
        .0
        .serialize()
}

/// Builds a transaction whose first input carries the overlay witness and
/// whose outputs bind the contract address (and vault deposit for wraps).
pub fn build_overlay_tx(spec: &OverlayTxSpec) -> Transaction {
    let sender = sender_keypair();
    let sender_pubkey = sender.x_only_public_key().0.serialize();
    let salt_sk = SecretKey::from_slice(&[44; 32]).expect("test: salt sk");
    let secp = Secp256k1::new();
    let salt_pubkey = Keypair::from_secret_key(&secp, &salt_sk)
        .x_only_public_key()
        .0
        .serialize();
    let secret = contract_secret();

    let parts = OverlayScriptParts {
        sender_pubkey,
        salt_pubkey,
        sender_pubkey_hash: hash::hash160(&sender_pubkey).0,
        contract_secret_hash: hash::hash160(&secret).0,
        kind: spec.kind,
        vault_keys_blob: (!spec.vault_keys.is_empty()).then(|| {
            spec.vault_keys
                .iter()
                .flat_map(|k| k.as_slice().to_vec())
                .collect()
        }),
        minimum_signatures: (spec.minimum_signatures > 0).then_some(spec.minimum_signatures),
        calldata: spec.calldata.clone(),
    };
    let script = build_overlay_script(&parts);

    // Stack layout: secret, sender key, script, control block.
    let mut witness = Witness::new();
    if spec.tamper_contract_secret {
        witness.push([9u8; 32]);
    } else {
        witness.push(secret);
    }
    witness.push(sender_pubkey);
    witness.push(script.as_bytes());
    let mut control_block = vec![0xc0u8];
    control_block.extend_from_slice(&sender_pubkey);
    witness.push(&control_block);

    let mut output = Vec::new();
    if !spec.omit_contract_output {
        let program = WitnessProgram::new(WitnessVersion::V1, &secret).expect("test: program");
        output.push(TxOut {
            value: Amount::from_sat(330),
            script_pubkey: ScriptBuf::new_witness_program(&program),
        });
    }
    if spec.kind == TemplateKind::Wrap {
        let (vault_address, _) =
            derive_vault_address(&spec.vault_keys, bitcoin::Network::Regtest)
                .expect("test: vault address");
        output.push(TxOut {
            value: Amount::from_sat(spec.deposit),
            script_pubkey: vault_address.script_pubkey(),
        });
    }

    Transaction {
        version: Version(2),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([5; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness,
        }],
        output,
    }
}
