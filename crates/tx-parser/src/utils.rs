use anyhow::anyhow;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::script::{Instruction, Instructions};
use bitcoin::secp256k1::{PublicKey, SECP256K1};
use bitcoin::taproot::TaprootBuilder;
use bitcoin::{Address, Network, Opcode, XOnlyPublicKey};
use musig2::KeyAggContext;
use tapnet_primitives::buf::Buf33;

/// Extract next instruction and try to parse it as an opcode.
pub fn next_op(instructions: &mut Instructions<'_>) -> Option<Opcode> {
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) => Some(op),
        _ => None,
    }
}

/// Extract next instruction and try to parse it as a byte slice.
pub fn next_bytes<'a>(instructions: &mut Instructions<'a>) -> Option<&'a [u8]> {
    match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => Some(bytes.as_bytes()),
        _ => None,
    }
}

/// Extract a small unsigned integer, either a minimal push or OP_1..OP_16.
pub fn next_small_int(instructions: &mut Instructions<'_>) -> Option<u32> {
    match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => {
            let b = bytes.as_bytes();
            match b.len() {
                0 => Some(0),
                1 => Some(b[0] as u32),
                _ => None,
            }
        }
        Some(Ok(Instruction::Op(op))) => {
            let opval = op.to_u8();
            let diff = opval.checked_sub(OP_PUSHNUM_1.to_u8())?;
            if diff < 16 {
                Some(diff as u32 + 1)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Aggregates the vault key set into its taproot address, along with the
/// untweaked internal key.
pub fn derive_vault_address(
    vault_pubkeys: &[Buf33],
    network: Network,
) -> anyhow::Result<(Address, XOnlyPublicKey)> {
    let keys = vault_pubkeys
        .iter()
        .map(|pk| PublicKey::from_slice(pk.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("vault key: {e}"))?;

    let x_only_pub_key = KeyAggContext::new(keys)?
        .aggregated_pubkey::<PublicKey>()
        .x_only_public_key()
        .0;

    let taproot_builder = TaprootBuilder::new();
    let spend_info = taproot_builder
        .finalize(SECP256K1, x_only_pub_key)
        .map_err(|_| anyhow!("taproot finalization"))?;
    let merkle_root = spend_info.merkle_root();

    let addr = Address::p2tr(SECP256K1, x_only_pub_key, merkle_root, network);
    Ok((addr, x_only_pub_key))
}

/// Renders the p2tr address of a sender key.
pub fn p2tr_address(sender_pubkey: &XOnlyPublicKey, network: Network) -> Address {
    Address::p2tr(SECP256K1, *sender_pubkey, None, network)
}

#[cfg(test)]
mod tests {
    use bitcoin::blockdata::script::Builder;
    use bitcoin::opcodes::all::{OP_CHECKSIG, OP_PUSHNUM_2};

    use super::*;

    #[test]
    fn test_next_small_int_forms() {
        let script = Builder::new()
            .push_opcode(OP_PUSHNUM_2)
            .push_slice([7u8])
            .push_opcode(OP_CHECKSIG)
            .into_script();
        let mut instructions = script.instructions();
        assert_eq!(next_small_int(&mut instructions), Some(2));
        assert_eq!(next_small_int(&mut instructions), Some(7));
        assert_eq!(next_small_int(&mut instructions), None);
    }
}
