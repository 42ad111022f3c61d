//! Block attestation records.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};

use crate::buf::{Buf32, Buf64};
use crate::hash;

/// One validator's attestation over a block's checksum digest.
///
/// Unique by `(block_number, identity)`.  `validator_pubkey` is absent for
/// trusted-set attestations, whose signers stay anonymous on the wire.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct BlockWitness {
    pub block_number: u64,

    /// hash512 of the signer key for validator witnesses; an opaque
    /// authority tag for trusted ones.
    pub identity: Buf64,

    pub signature: Buf64,

    /// Present only for validator witnesses.
    pub validator_pubkey: Option<Buf32>,

    /// Unix millis at first receipt.
    pub timestamp: u64,

    /// Back-filled when the attestation is promoted into an epoch.
    pub proofs: Option<Vec<Vec<u8>>>,
}

impl BlockWitness {
    pub fn is_trusted(&self) -> bool {
        self.validator_pubkey.is_none()
    }

    /// Checks that the claimed identity matches the embedded key, for
    /// validator witnesses.  Trusted witnesses carry no key to check.
    pub fn identity_matches_key(&self) -> bool {
        match &self.validator_pubkey {
            Some(pk) => self.identity == hash::hash512(pk.as_slice()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matches_key() {
        let pk = Buf32::from([9; 32]);
        let w = BlockWitness {
            block_number: 10,
            identity: hash::hash512(pk.as_slice()),
            signature: Buf64::zero(),
            validator_pubkey: Some(pk),
            timestamp: 0,
            proofs: None,
        };
        assert!(w.identity_matches_key());
        assert!(!w.is_trusted());

        let mut bad = w.clone();
        bad.identity = Buf64::zero();
        assert!(!bad.identity_matches_key());
    }
}
