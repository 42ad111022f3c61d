use tokio::sync::watch;

/// Sender side of the shutdown channel.  Cloneable; any holder can bring the
/// node down.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Triggers shutdown.  Idempotent.
    pub fn send(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> ShutdownGuard {
        ShutdownGuard {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side handed to tasks; polled at batch boundaries and awaited in
/// select loops.
#[derive(Clone, Debug)]
pub struct ShutdownGuard {
    rx: watch::Receiver<bool>,
}

impl ShutdownGuard {
    /// Nonblocking check, for cooperative loops.
    pub fn should_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered.
    pub async fn wait_for_shutdown(&mut self) {
        // If the sender is gone we're shutting down anyway.
        let _ = self.rx.wait_for(|v| *v).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_flag_visible_to_all_guards() {
        let sig = ShutdownSignal::new();
        let g1 = sig.subscribe();
        let g2 = sig.subscribe();
        assert!(!g1.should_shutdown());
        sig.send();
        assert!(g1.should_shutdown());
        assert!(g2.should_shutdown());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves() {
        let sig = ShutdownSignal::new();
        let mut guard = sig.subscribe();
        let waiter = tokio::spawn(async move { guard.wait_for_shutdown().await });
        sig.send();
        waiter.await.expect("test: waiter join");
    }
}
