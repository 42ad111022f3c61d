//! Seam to the overlay contract VM.  The node only depends on the
//! prepare/execute/finalize contract; the actual VM is an external
//! collaborator.

use tapnet_primitives::buf::Buf32;
use tapnet_primitives::tx::TransactionRecord;

/// Per-block execution outcome the commit path folds into the block record.
#[derive(Clone, Debug, Default)]
pub struct ExecutionOutcome {
    pub receipt_root: Buf32,
    pub storage_root: Buf32,

    /// Gas used per transaction, same order as submitted.
    pub gas_used: Vec<u64>,
}

pub trait VmHook: Send + Sync + 'static {
    /// Called before executing a block's transactions.
    fn prepare(&self, height: u64);

    /// Executes the overlay transactions of a block and returns the roots.
    fn execute(&self, height: u64, txs: &[TransactionRecord]) -> ExecutionOutcome;

    /// Called after the block is durably committed.
    fn finalize(&self, height: u64);
}

/// VM stub for nodes indexing without contract execution.
#[derive(Clone, Debug, Default)]
pub struct NoopVm;

impl VmHook for NoopVm {
    fn prepare(&self, _height: u64) {}

    fn execute(&self, _height: u64, txs: &[TransactionRecord]) -> ExecutionOutcome {
        ExecutionOutcome {
            gas_used: vec![0; txs.len()],
            ..Default::default()
        }
    }

    fn finalize(&self, _height: u64) {}
}
