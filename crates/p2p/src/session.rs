//! One peer session: handshake under a deadline, then the packet loop.

use std::time::Duration;

use tapnet_mempool::MempoolHandle;
use tapnet_witness::{PacketVerdict, WitnessHandle};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::*;

use crate::encryptem::{EncryptemSession, Hello, NodeIdentity, PendingSession};
use crate::errors::SessionError;
use crate::framing::{read_frame, write_frame, Direction};
use crate::packet::Packet;

/// Which side of the connection we are; decides the direction byte we emit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// We dialed out.
    Initiator,
    /// We accepted the connection.
    Responder,
}

impl Role {
    fn outgoing_direction(&self) -> Direction {
        match self {
            Role::Initiator => Direction::ToServer,
            Role::Responder => Direction::ToClient,
        }
    }

    fn expected_direction(&self) -> Direction {
        match self {
            Role::Initiator => Direction::ToClient,
            Role::Responder => Direction::ToServer,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub auth_timeout: Duration,
    pub ping_interval: Duration,

    /// Addresses we hand out on Discover.
    pub known_peers: Vec<String>,
}

/// Worker handles the session forwards inbound traffic into.
#[derive(Clone)]
pub struct SessionHandlers {
    pub witness: WitnessHandle,
    pub mempool: MempoolHandle,
}

/// Runs one session to completion.  `outbound_rx` carries packets the node
/// wants gossiped to this peer.
pub async fn run_session<S>(
    stream: S,
    role: Role,
    identity: &NodeIdentity,
    handlers: SessionHandlers,
    config: SessionConfig,
    mut outbound_rx: mpsc::Receiver<Packet>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Handshake under the auth deadline: send our hello, read theirs.
    let pending = PendingSession::new(identity);
    let hello_bytes =
        borsh::to_vec(&pending.hello()).map_err(|_| SessionError::Crypto("hello encode"))?;
    write_frame(&mut writer, role.outgoing_direction(), &hello_bytes).await?;

    let peer_hello = tokio::time::timeout(config.auth_timeout, async {
        let (direction, payload) = read_frame(&mut reader).await?;
        if direction != role.expected_direction() {
            return Err(SessionError::BadPacket("direction mismatch".to_string()));
        }
        borsh::from_slice::<Hello>(&payload)
            .map_err(|_| SessionError::BadPacket("undecodable hello".to_string()))
    })
    .await
    .map_err(|_| SessionError::AuthTimeout)??;

    let session = std::sync::Arc::new(pending.establish(&peer_hello)?);
    debug!(?role, "session established");

    // Frame reads span multiple awaits and are not cancellation safe, so
    // inbound decoding gets its own task feeding a channel the main loop
    // can select on.
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<Result<Packet, SessionError>>(32);
    let read_session = session.clone();
    let read_task = tokio::spawn(async move {
        loop {
            let item = async {
                let (direction, envelope) = read_frame(&mut reader).await?;
                if direction != role.expected_direction() {
                    return Err(SessionError::BadPacket("direction mismatch".to_string()));
                }
                let plaintext = read_session.open(&envelope)?;
                borsh::from_slice::<Packet>(&plaintext)
                    .map_err(|e| SessionError::BadPacket(e.to_string()))
            }
            .await;

            let failed = item.is_err();
            if inbound_tx.send(item).await.is_err() || failed {
                return;
            }
        }
    });

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ping_nonce = 0u64;
    let mut violations = 0u32;

    let result = loop {
        tokio::select! {
            maybe_inbound = inbound_rx.recv() => {
                let packet = match maybe_inbound {
                    Some(Ok(packet)) => packet,
                    Some(Err(e)) => break Err(e),
                    None => break Err(SessionError::Closed),
                };
                match handle_packet(packet, &handlers, &config, &mut violations).await {
                    Ok(Some(reply)) => {
                        if let Err(e) = send_packet(&mut writer, &session, role, &reply).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => break Err(e),
                }
            }

            maybe_packet = outbound_rx.recv() => {
                let Some(packet) = maybe_packet else {
                    // Node is shutting down the gossip side.
                    break Ok(());
                };
                if let Err(e) = send_packet(&mut writer, &session, role, &packet).await {
                    break Err(e);
                }
            }

            _ = ping_interval.tick() => {
                ping_nonce += 1;
                let ping = Packet::Ping { nonce: ping_nonce };
                if let Err(e) = send_packet(&mut writer, &session, role, &ping).await {
                    break Err(e);
                }
            }
        }
    };

    read_task.abort();
    result
}

async fn send_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    session: &EncryptemSession,
    role: Role,
    packet: &Packet,
) -> Result<(), SessionError> {
    let plaintext = borsh::to_vec(packet).map_err(|_| SessionError::Crypto("packet encode"))?;
    let envelope = session.seal(&plaintext)?;
    write_frame(writer, role.outgoing_direction(), &envelope).await
}

/// Consensus violations a peer gets away with before we cut the session.
const MAX_CONSENSUS_VIOLATIONS: u32 = 3;

/// Dispatches one authenticated packet; `Some` is the immediate reply.
async fn handle_packet(
    packet: Packet,
    handlers: &SessionHandlers,
    config: &SessionConfig,
    violations: &mut u32,
) -> Result<Option<Packet>, SessionError> {
    match packet {
        Packet::Ping { nonce } => Ok(Some(Packet::Pong { nonce })),
        Packet::Pong { .. } => Ok(None),

        Packet::Discover => Ok(Some(Packet::DiscoveryResponse {
            peers: config.known_peers.clone(),
        })),
        Packet::DiscoveryResponse { peers } => {
            trace!(count = peers.len(), "peer discovery response");
            Ok(None)
        }

        Packet::BlockHeaderWitness(witness_packet) => {
            if handlers.witness.submit_packet(witness_packet).await == PacketVerdict::Violation {
                *violations += 1;
                if *violations >= MAX_CONSENSUS_VIOLATIONS {
                    return Err(SessionError::BadPacket(
                        "repeated consensus violations".to_string(),
                    ));
                }
            }
            Ok(None)
        }

        Packet::SyncBlockHeadersRequest { start, end } => {
            if end < start || end - start > 1000 {
                return Err(SessionError::BadPacket(format!(
                    "sync range {start}..{end}"
                )));
            }
            let mut witnesses = Vec::new();
            for block in start..end {
                let stored = handlers.witness.witnesses_for_block(block).await;
                if !stored.is_empty() {
                    witnesses.push((block, stored));
                }
            }
            Ok(Some(Packet::SyncBlockHeadersResponse { witnesses }))
        }
        Packet::SyncBlockHeadersResponse { witnesses } => {
            trace!(blocks = witnesses.len(), "historic witnesses received");
            // Stored on the requester path via the witness manager once the
            // blocks verify; a bare response without request is ignored.
            Ok(None)
        }

        Packet::BroadcastTransaction { raw, psbt } => {
            let response = handlers.mempool.submit_transaction(raw, psbt, None).await;
            if !response.success {
                trace!(err = ?response.error, "gossiped transaction rejected");
            }
            Ok(None)
        }
    }
}
