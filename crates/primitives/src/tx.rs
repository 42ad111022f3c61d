//! Overlay transaction records as parsed out of base-chain blocks.
//!
//! Variants form a tagged sum, each owning its extra fields.  Records are
//! immutable after commit.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};

use crate::buf::{Buf20, Buf32, Buf33};

/// Kind discriminant, also used by the mempool to tag accepted entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub enum TxKind {
    Generic,
    Interaction,
    WrapInteraction,
    UnwrapInteraction,
    Deployment,
}

/// One spent outpoint plus its witness stack.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct TxInput {
    pub prev_txid: Buf32,
    pub prev_vout: u32,
    pub witness: Vec<Vec<u8>>,
}

/// One created output.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,

    /// Rendered address, if the script has a standard form.
    pub address: Option<String>,
}

/// Fields shared by every interaction-flavored variant.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct InteractionData {
    /// Schnorr x-only key the interaction is signed under.
    pub sender_pubkey: Buf32,

    /// Per-interaction salt key, prevents witness replay across contracts.
    pub salt_pubkey: Buf32,

    /// hash160 commitment to the sender key embedded in the script.
    pub sender_pubkey_hash: Buf20,

    /// hash160 commitment to the contract secret embedded in the script.
    pub contract_secret_hash: Buf20,

    /// Decompressed calldata.
    pub calldata: Vec<u8>,

    /// Whether the calldata arrived compressed on the wire.
    pub was_compressed: bool,
}

/// Extra fields carried by a wrap (deposit) interaction.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct WrapData {
    /// Multisig vault keys, compressed.
    pub vault_pubkeys: Vec<Buf33>,

    /// Threshold over `vault_pubkeys`.
    pub minimum_signatures: u32,

    /// Derived vault address the deposit landed on.
    pub vault_address: String,

    /// Gross sats locked into the vault output.
    pub deposit_amount: u64,

    /// Total wrapping fees taken off the deposit.
    pub wrapping_fees: u64,

    /// Fee slice assigned to indexer validators.
    pub validator_fee: u64,

    /// Fee slice assigned to stackers.
    pub stacking_fee: u64,

    /// Fee remainder assigned to the overlay treasury.
    pub treasury_fee: u64,
}

/// Extra fields carried by an unwrap (withdrawal) interaction.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct UnwrapData {
    /// Sats being released from the vault.
    pub amount: u64,

    /// Address the released sats are paid to.
    pub target_address: String,
}

/// Extra fields carried by a contract deployment.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct DeploymentData {
    /// Contract bytecode, decompressed.
    pub bytecode: Vec<u8>,

    /// Whether the bytecode arrived compressed on the wire.
    pub was_compressed: bool,
}

/// Variant payloads.  `Generic` is any base-chain tx we indexed without
/// overlay semantics.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub enum TxPayload {
    Generic,
    Interaction(InteractionData),
    WrapInteraction(InteractionData, WrapData),
    UnwrapInteraction(InteractionData, UnwrapData),
    Deployment(InteractionData, DeploymentData),
}

impl TxPayload {
    pub fn kind(&self) -> TxKind {
        match self {
            TxPayload::Generic => TxKind::Generic,
            TxPayload::Interaction(..) => TxKind::Interaction,
            TxPayload::WrapInteraction(..) => TxKind::WrapInteraction,
            TxPayload::UnwrapInteraction(..) => TxKind::UnwrapInteraction,
            TxPayload::Deployment(..) => TxKind::Deployment,
        }
    }

    /// The shared interaction prefix, if the variant has one.
    pub fn interaction(&self) -> Option<&InteractionData> {
        match self {
            TxPayload::Generic => None,
            TxPayload::Interaction(d)
            | TxPayload::WrapInteraction(d, _)
            | TxPayload::UnwrapInteraction(d, _)
            | TxPayload::Deployment(d, _) => Some(d),
        }
    }
}

/// A transaction as we commit it, immutable afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize)]
pub struct TransactionRecord {
    txid: Buf32,
    block_height: u64,
    index_in_block: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,

    /// p2tr address derived from the witness sender key, if any.
    from: Option<String>,

    /// Address of the contract the interaction targets, if any.
    contract_address: Option<String>,

    gas_used: u64,
    priority_fee: u64,
    burned_value: u64,

    /// Execution receipt, filled by the VM collaborator.
    receipt: Option<Vec<u8>>,

    payload: TxPayload,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        txid: Buf32,
        block_height: u64,
        index_in_block: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        from: Option<String>,
        contract_address: Option<String>,
        payload: TxPayload,
    ) -> Self {
        Self {
            txid,
            block_height,
            index_in_block,
            inputs,
            outputs,
            from,
            contract_address,
            gas_used: 0,
            priority_fee: 0,
            burned_value: 0,
            receipt: None,
            payload,
        }
    }

    pub fn txid(&self) -> &Buf32 {
        &self.txid
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn index_in_block(&self) -> u32 {
        self.index_in_block
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn contract_address(&self) -> Option<&str> {
        self.contract_address.as_deref()
    }

    pub fn payload(&self) -> &TxPayload {
        &self.payload
    }

    pub fn kind(&self) -> TxKind {
        self.payload.kind()
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn set_gas_used(&mut self, gas: u64) {
        self.gas_used = gas;
    }

    pub fn priority_fee(&self) -> u64 {
        self.priority_fee
    }

    pub fn set_priority_fee(&mut self, fee: u64) {
        self.priority_fee = fee;
    }

    pub fn burned_value(&self) -> u64 {
        self.burned_value
    }

    pub fn set_burned_value(&mut self, value: u64) {
        self.burned_value = value;
    }

    pub fn receipt(&self) -> Option<&[u8]> {
        self.receipt.as_deref()
    }

    pub fn set_receipt(&mut self, receipt: Vec<u8>) {
        self.receipt = Some(receipt);
    }
}
