//! Value types persisted by the node that don't belong to the primitives
//! data model proper.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tapnet_primitives::buf::Buf32;
use tapnet_primitives::tx::TxKind;

/// Outpoint reference carried by a mempool entry input.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Arbitrary, BorshSerialize, BorshDeserialize,
)]
pub struct MempoolInput {
    pub prev_txid: Buf32,
    pub prev_vout: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct MempoolOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    pub address: Option<String>,
}

/// One accepted-but-unconfirmed transaction.  Unique by `id`, which is the
/// base-chain txid once the chain has accepted the raw bytes.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct MempoolEntry {
    pub id: Buf32,
    pub raw: Vec<u8>,
    pub psbt: bool,

    /// Committed height at the time we first saw the entry.
    pub block_height: u64,

    /// Unix millis at first sighting.
    pub first_seen: u64,

    pub kind: TxKind,
    pub inputs: Vec<MempoolInput>,
    pub outputs: Vec<MempoolOutput>,
    pub from: Option<String>,
    pub contract_address: Option<String>,
    pub calldata: Option<Vec<u8>>,
    pub bytecode: Option<Vec<u8>>,
    pub theoretical_gas_limit: u64,
    pub priority_fee: u64,
}

/// Bulk import phases, in execution order.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum IbdPhase {
    HeaderDownload,
    ChecksumGeneration,
    TransactionDownload,
    WitnessSync,
    EpochFinalization,
    Complete,
}

impl IbdPhase {
    /// The phase run after this one, if any.
    pub fn next(&self) -> Option<IbdPhase> {
        match self {
            IbdPhase::HeaderDownload => Some(IbdPhase::ChecksumGeneration),
            IbdPhase::ChecksumGeneration => Some(IbdPhase::TransactionDownload),
            IbdPhase::TransactionDownload => Some(IbdPhase::WitnessSync),
            IbdPhase::WitnessSync => Some(IbdPhase::EpochFinalization),
            IbdPhase::EpochFinalization => Some(IbdPhase::Complete),
            IbdPhase::Complete => None,
        }
    }
}

/// The single bulk-import checkpoint row, replaced atomically as phases
/// progress.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct IbdCheckpoint {
    pub phase: IbdPhase,

    /// Last height fully committed within the phase.
    pub last_completed: u64,

    /// Height the phase originally started from, for restart decisions.
    pub original_start: u64,

    /// Height the import is running towards.
    pub target: u64,
}

/// A stored post-quantum public key, keyed by its hash.  Reorg handling is
/// delete-by-height.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct MldsaKeyEntry {
    pub key_hash: Buf32,
    pub public_key: Vec<u8>,
    pub block_height: u64,
}

/// Tracked anyone-can-spend output left behind by wrap-vault change.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct AnyoneCanSpendRecord {
    pub txid: Buf32,
    pub vout: u32,
    pub value: u64,
    pub block_height: u64,
}
