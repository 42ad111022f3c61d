use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::*;

use crate::shutdown::{ShutdownGuard, ShutdownSignal};

/// Error that brought a critical task down.
#[derive(Debug, thiserror::Error)]
#[error("task '{name}' failed: {error}")]
pub struct TaskError {
    name: String,
    error: String,
}

impl TaskError {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owns the set of critical tasks and decides when the process exits.
pub struct TaskManager {
    handle: Handle,
    shutdown: ShutdownSignal,
    err_tx: mpsc::UnboundedSender<TaskError>,
    err_rx: std::sync::Mutex<mpsc::UnboundedReceiver<TaskError>>,
    active: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl TaskManager {
    pub fn new(handle: Handle) -> Self {
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        Self {
            handle,
            shutdown: ShutdownSignal::new(),
            err_tx,
            err_rx: std::sync::Mutex::new(err_rx),
            active: Arc::new(AtomicUsize::new(0)),
            idle_notify: Arc::new(Notify::new()),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            shutdown: self.shutdown.clone(),
            err_tx: self.err_tx.clone(),
            active: self.active.clone(),
            idle_notify: self.idle_notify.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Spawns listeners that translate process signals into shutdown.
    pub fn start_signal_listeners(&self) {
        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("got ctrl-c, shutting down");
                shutdown.send();
            }
        });
    }

    /// Blocks until a critical task fails or shutdown is triggered, then
    /// waits up to `grace` for remaining tasks to unwind.
    pub fn monitor(&self, grace: Option<Duration>) -> anyhow::Result<()> {
        let mut guard = self.shutdown.subscribe();
        let mut err_rx = self.err_rx.lock().expect("tasks: err chan lock");

        let res = self.handle.block_on(async {
            tokio::select! {
                biased;
                maybe_err = err_rx.recv() => maybe_err,
                _ = guard.wait_for_shutdown() => None,
            }
        });
        // A failing task also triggers shutdown; if the shutdown branch won
        // that race, pick the recorded error up anyway.
        let res = res.or_else(|| err_rx.try_recv().ok());

        // Whatever got us here, everyone else should stop too.
        self.shutdown.send();

        if let Some(grace) = grace {
            self.wait_for_idle(grace);
        }

        match res {
            Some(err) => {
                error!(task = %err.name(), "critical task failed");
                Err(err.into())
            }
            None => Ok(()),
        }
    }

    fn wait_for_idle(&self, grace: Duration) {
        let active = self.active.clone();
        let notify = self.idle_notify.clone();
        let res = self.handle.block_on(async move {
            tokio::time::timeout(grace, async {
                while active.load(Ordering::Acquire) > 0 {
                    notify.notified().await;
                }
            })
            .await
        });
        if res.is_err() {
            warn!(
                remaining = self.active.load(Ordering::Acquire),
                "tasks did not unwind within grace period"
            );
        }
    }
}

/// Cloneable spawner for critical tasks.
#[derive(Clone)]
pub struct TaskExecutor {
    handle: Handle,
    shutdown: ShutdownSignal,
    err_tx: mpsc::UnboundedSender<TaskError>,
    active: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl TaskExecutor {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a blocking critical task.  The closure gets a shutdown guard it
    /// is expected to poll.
    pub fn spawn_critical<F>(&self, name: &'static str, func: F)
    where
        F: FnOnce(ShutdownGuard) -> anyhow::Result<()> + Send + 'static,
    {
        let guard = self.shutdown.subscribe();
        let tracker = self.track();
        self.handle.spawn_blocking(move || {
            let _tracker = tracker;
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| func(guard)));
            tracker_finish(name, flatten_outcome(outcome), &_tracker);
        });
    }

    /// Spawns an async critical task.
    pub fn spawn_critical_async<F>(&self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let tracker = self.track();
        self.handle.spawn(async move {
            let _tracker = tracker;
            let outcome = panic::AssertUnwindSafe(fut).catch_unwind().await;
            tracker_finish(name, flatten_outcome(outcome), &_tracker);
        });
    }

    fn track(&self) -> Tracker {
        self.active.fetch_add(1, Ordering::AcqRel);
        Tracker {
            err_tx: self.err_tx.clone(),
            shutdown: self.shutdown.clone(),
            active: self.active.clone(),
            idle_notify: self.idle_notify.clone(),
        }
    }
}

struct Tracker {
    err_tx: mpsc::UnboundedSender<TaskError>,
    shutdown: ShutdownSignal,
    active: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.idle_notify.notify_waiters();
    }
}

fn flatten_outcome(
    outcome: Result<anyhow::Result<()>, Box<dyn std::any::Any + Send>>,
) -> Result<(), String> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic_payload) => {
            let msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(format!("panic: {msg}"))
        }
    }
}

fn tracker_finish(name: &'static str, res: Result<(), String>, tracker: &Tracker) {
    match res {
        Ok(()) => debug!(task = %name, "critical task finished"),
        Err(error) => {
            let _ = tracker.err_tx.send(TaskError {
                name: name.to_string(),
                error,
            });
            tracker.shutdown.send();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("test: build rt")
    }

    #[test]
    fn test_monitor_returns_err_on_task_failure() {
        let rt = make_runtime();
        let manager = TaskManager::new(rt.handle().clone());
        let executor = manager.executor();

        executor.spawn_critical("boom", |_g| anyhow::bail!("it broke"));

        let res = manager.monitor(Some(Duration::from_secs(1)));
        assert!(res.is_err(), "failed task must surface from monitor");
    }

    #[test]
    fn test_monitor_returns_ok_on_shutdown() {
        let rt = make_runtime();
        let manager = TaskManager::new(rt.handle().clone());
        let executor = manager.executor();

        executor.spawn_critical("wait-loop", |guard| {
            while !guard.should_shutdown() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });

        manager.shutdown_signal().send();
        let res = manager.monitor(Some(Duration::from_secs(1)));
        assert!(res.is_ok());
    }

    #[test]
    fn test_panic_is_reported_not_swallowed() {
        let rt = make_runtime();
        let manager = TaskManager::new(rt.handle().clone());
        let executor = manager.executor();

        executor.spawn_critical("panicker", |_g| panic!("kaboom"));

        let res = manager.monitor(Some(Duration::from_secs(1)));
        let err = res.expect_err("panicking task must surface as error");
        assert!(format!("{err:#}").contains("panicker"));
    }
}
