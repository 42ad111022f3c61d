//! Worker pool for parallel transaction parsing.
//!
//! Jobs are dispatched round-robin onto dedicated threads; each worker has
//! its own queue, so a dying worker fails only the requests in flight on
//! it (their response channels drop and the caller sees an error for those
//! request ids alone).  Workers receive a consensus-params snapshot with
//! every job instead of reading shared state.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use bitcoin::Transaction;
use tapnet_primitives::params::OverlayParams;
use tapnet_tx_parser::{parse_overlay_tx, ParsedOverlay};
use tokio::sync::oneshot;
use tracing::*;

/// Outcome of one parse request; errors are strings so they cross the
/// thread boundary without type baggage.
pub type ParseOutcome = Result<Option<ParsedOverlay>, String>;

struct ParseJob {
    req_id: u64,
    tx: Transaction,
    input_index: usize,
    params: Arc<OverlayParams>,
    resp_tx: oneshot::Sender<ParseOutcome>,
}

struct WorkerHandle {
    job_tx: mpsc::Sender<ParseJob>,
}

pub struct ParsePool {
    workers: Vec<WorkerHandle>,
    next_worker: AtomicUsize,
    next_req_id: AtomicU64,
}

impl ParsePool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let workers = (0..size)
            .map(|worker_idx| {
                let (job_tx, job_rx) = mpsc::channel::<ParseJob>();
                thread::Builder::new()
                    .name(format!("tapnet-parse-{worker_idx}"))
                    .spawn(move || worker_loop(worker_idx, job_rx))
                    .expect("parse_pool: spawn worker");
                WorkerHandle { job_tx }
            })
            .collect();
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            next_req_id: AtomicU64::new(0),
        }
    }

    pub fn with_hardware_concurrency() -> Self {
        let size = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(size)
    }

    /// Queues one transaction for parsing, returning the response slot.  A
    /// dropped receiver-side error means the worker died mid-request.
    pub fn dispatch(
        &self,
        tx: Transaction,
        input_index: usize,
        params: Arc<OverlayParams>,
    ) -> oneshot::Receiver<ParseOutcome> {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let (resp_tx, resp_rx) = oneshot::channel();

        let job = ParseJob {
            req_id,
            tx,
            input_index,
            params,
            resp_tx,
        };
        if self.workers[idx].job_tx.send(job).is_err() {
            // Worker is gone; the dropped resp_tx inside the failed send
            // already signals the caller.
            warn!(worker = %idx, "parse worker queue closed");
        }
        resp_rx
    }
}

fn worker_loop(worker_idx: usize, job_rx: mpsc::Receiver<ParseJob>) {
    debug!(worker = %worker_idx, "parse worker up");
    while let Ok(job) = job_rx.recv() {
        let outcome = parse_overlay_tx(&job.tx, job.input_index, &job.params)
            .map_err(|e| format!("req {}: {e}", job.req_id));
        let _ = job.resp_tx.send(outcome);
    }
    debug!(worker = %worker_idx, "parse worker down");
}

#[cfg(test)]
mod tests {
    use tapnet_primitives::params::regtest_params;
    use tapnet_primitives::tx::TxPayload;
    use tapnet_tx_parser::test_utils::{build_overlay_tx, OverlayTxSpec};

    use super::*;

    #[tokio::test]
    async fn test_pool_parses_in_parallel_and_in_order() {
        let pool = ParsePool::new(3);
        let params = Arc::new(regtest_params().overlay);

        let receivers: Vec<_> = (0..10)
            .map(|i| {
                let spec = OverlayTxSpec::interaction(vec![i as u8; 32]);
                pool.dispatch(build_overlay_tx(&spec), 0, params.clone())
            })
            .collect();

        for (i, rx) in receivers.into_iter().enumerate() {
            let parsed = rx
                .await
                .expect("worker alive")
                .expect("parse ok")
                .expect("is overlay");
            let TxPayload::Interaction(data) = parsed.payload else {
                panic!("wrong variant");
            };
            assert_eq!(data.calldata, vec![i as u8; 32], "responses keyed by request");
        }
    }

    #[tokio::test]
    async fn test_non_overlay_parses_to_none() {
        let pool = ParsePool::new(1);
        let params = Arc::new(regtest_params().overlay);

        let mut tx = build_overlay_tx(&OverlayTxSpec::interaction(vec![1])) ;
        tx.input[0].witness = bitcoin::Witness::new();

        let outcome = pool
            .dispatch(tx, 0, params)
            .await
            .expect("worker alive")
            .expect("no error");
        assert!(outcome.is_none());
    }
}
