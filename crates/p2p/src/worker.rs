//! P2P worker: listener, outbound dials, and gossip fanout to sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tapnet_config::P2pConfig;
use tapnet_tasks::{ShutdownGuard, TaskExecutor};
use tapnet_witness::WitnessPacket;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::*;

use crate::encryptem::NodeIdentity;
use crate::packet::Packet;
use crate::session::{run_session, Role, SessionConfig, SessionHandlers};

const SESSION_OUTBOUND_CAPACITY: usize = 64;

/// Pause before redialing a configured peer that dropped.
const REDIAL_DELAY: Duration = Duration::from_secs(10);

pub struct P2pContext {
    pub config: P2pConfig,
    pub identity: NodeIdentity,
    pub handlers: SessionHandlers,
}

/// Registry of live session outbound queues.
#[derive(Clone, Default)]
struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<u64, mpsc::Sender<Packet>>>>,
}

impl SessionRegistry {
    fn insert(&self, id: u64, tx: mpsc::Sender<Packet>) {
        self.sessions.lock().insert(id, tx);
    }

    fn remove(&self, id: u64) {
        self.sessions.lock().remove(&id);
    }

    /// Best-effort fanout; slow sessions drop gossip rather than stall.
    fn broadcast(&self, packet: &Packet) {
        let sessions = self.sessions.lock();
        for (id, tx) in sessions.iter() {
            if tx.try_send(packet.clone()).is_err() {
                trace!(session = %id, "session outbound full, dropping gossip");
            }
        }
    }
}

/// Spawns the p2p worker: a listener task, dialer tasks for configured
/// peers, and the witness gossip pump.
pub fn start_p2p_worker(
    executor: &TaskExecutor,
    ctx: P2pContext,
    mut witness_outbound: mpsc::Receiver<WitnessPacket>,
    shutdown: ShutdownGuard,
) {
    let registry = SessionRegistry::default();
    let session_config = SessionConfig {
        auth_timeout: Duration::from_secs(ctx.config.auth_timeout_secs),
        ping_interval: Duration::from_secs(ctx.config.ping_interval_secs),
        known_peers: ctx.config.peers.clone(),
    };
    let identity = Arc::new(ctx.identity);

    // Gossip pump: local attestations fan out to every live session.
    {
        let registry = registry.clone();
        let mut shutdown_rx = shutdown.clone();
        executor.spawn_critical_async("p2p-gossip-pump", async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.wait_for_shutdown() => return Ok(()),
                    maybe = witness_outbound.recv() => {
                        let Some(packet) = maybe else { return Ok(()) };
                        registry.broadcast(&Packet::BlockHeaderWitness(packet));
                    }
                }
            }
        });
    }

    // Listener.
    {
        let registry = registry.clone();
        let identity = identity.clone();
        let handlers = ctx.handlers.clone();
        let session_config = session_config.clone();
        let listen_addr = ctx.config.listen_addr.clone();
        let executor_inner = executor.clone();
        let mut shutdown_rx = shutdown.clone();
        executor.spawn_critical_async("p2p-listener", async move {
            let listener = TcpListener::bind(&listen_addr).await?;
            info!(%listen_addr, "p2p listening");
            let mut next_session_id = 0u64;

            loop {
                tokio::select! {
                    _ = shutdown_rx.wait_for_shutdown() => return Ok(()),
                    accepted = listener.accept() => {
                        let (stream, peer_addr) = accepted?;
                        next_session_id += 1;
                        debug!(%peer_addr, "inbound peer");
                        spawn_session(
                            &executor_inner,
                            stream,
                            Role::Responder,
                            next_session_id,
                            registry.clone(),
                            identity.clone(),
                            handlers.clone(),
                            session_config.clone(),
                        );
                    }
                }
            }
        });
    }

    // Dialers for configured peers, with redial.
    for (idx, peer_addr) in ctx.config.peers.iter().cloned().enumerate() {
        let registry = registry.clone();
        let identity = identity.clone();
        let handlers = ctx.handlers.clone();
        let session_config = session_config.clone();
        let executor_inner = executor.clone();
        let mut shutdown_rx = shutdown.clone();
        // Dialer session ids live in their own range.
        let session_id_base = u64::MAX / 2 + idx as u64;

        executor.spawn_critical_async("p2p-dialer", async move {
            loop {
                if shutdown_rx.should_shutdown() {
                    return Ok(());
                }
                match TcpStream::connect(&peer_addr).await {
                    Ok(stream) => {
                        debug!(%peer_addr, "dialed peer");
                        spawn_session(
                            &executor_inner,
                            stream,
                            Role::Initiator,
                            session_id_base,
                            registry.clone(),
                            identity.clone(),
                            handlers.clone(),
                            session_config.clone(),
                        );
                        // One live session per configured peer; wait for it
                        // to die before redialing.
                        loop {
                            tokio::time::sleep(REDIAL_DELAY).await;
                            if shutdown_rx.should_shutdown() {
                                return Ok(());
                            }
                            if !registry.sessions.lock().contains_key(&session_id_base) {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        trace!(%peer_addr, err = %e, "dial failed");
                        tokio::select! {
                            _ = shutdown_rx.wait_for_shutdown() => return Ok(()),
                            _ = tokio::time::sleep(REDIAL_DELAY) => {}
                        }
                    }
                }
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_session(
    executor: &TaskExecutor,
    stream: TcpStream,
    role: Role,
    session_id: u64,
    registry: SessionRegistry,
    identity: Arc<NodeIdentity>,
    handlers: SessionHandlers,
    config: SessionConfig,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel(SESSION_OUTBOUND_CAPACITY);
    registry.insert(session_id, outbound_tx);

    executor.handle().spawn(async move {
        let res = run_session(stream, role, &identity, handlers, config, outbound_rx).await;
        match res {
            Ok(()) => debug!(%session_id, "session closed"),
            Err(e) => debug!(%session_id, err = %e, "session dropped"),
        }
        registry.remove(session_id);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_broadcast_skips_full_sessions() {
        let registry = SessionRegistry::default();
        let (tx_ok, mut rx_ok) = mpsc::channel(4);
        let (tx_full, _rx_full) = mpsc::channel(1);
        tx_full.try_send(Packet::Discover).unwrap();

        registry.insert(1, tx_ok);
        registry.insert(2, tx_full);

        registry.broadcast(&Packet::Ping { nonce: 1 });

        assert_eq!(rx_ok.try_recv().unwrap(), Packet::Ping { nonce: 1 });
    }
}
