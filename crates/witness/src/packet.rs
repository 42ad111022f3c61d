//! Attestation wire types.

use borsh::{BorshDeserialize, BorshSerialize};
use tapnet_primitives::buf::{Buf32, Buf64};

/// A validator's signature over a block digest, identity disclosed.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorWitnessSig {
    /// hash512 of `pubkey`.
    pub identity: Buf64,
    pub signature: Buf64,
    pub pubkey: Buf32,
}

/// A trusted-set signature; the signer is only identified by an opaque
/// identity tag, never by key, so rebroadcasts can't expose membership.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct TrustedWitnessSig {
    pub identity: Buf64,
    pub signature: Buf64,
}

/// One attestation packet as exchanged between peers.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct WitnessPacket {
    pub block_number: u64,
    pub block_hash: Buf32,

    /// The checksum root the signers claim for this block.
    pub checksum_hash: Buf32,

    pub validator_witnesses: Vec<ValidatorWitnessSig>,
    pub trusted_witnesses: Vec<TrustedWitnessSig>,
}

impl WitnessPacket {
    pub fn is_empty(&self) -> bool {
        self.validator_witnesses.is_empty() && self.trusted_witnesses.is_empty()
    }
}
