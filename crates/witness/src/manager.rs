//! The witness manager: a sliding verification window around the committed
//! tip.
//!
//! Packets ahead of us queue until we catch up; packets behind the window
//! drop; everything else verifies immediately against stored state.  Fresh
//! trusted identities are rebroadcast under our own validator signature so
//! our trusted-set membership (if any) never leaks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use secp256k1::Keypair;
use tapnet_indexer::ChainEvent;
use tapnet_primitives::block::compute_witness_digest;
use tapnet_primitives::buf::{Buf32, Buf64};
use tapnet_primitives::witness::BlockWitness;
use tapnet_storage::{BlockDataOps, WitnessOps};
use tapnet_tasks::{ShutdownGuard, TaskExecutor};
use tokio::sync::{broadcast, mpsc};
use tracing::*;

use crate::crypto::{identity_of, pubkey_buf, sign_digest, verify_signature};
use crate::packet::{TrustedWitnessSig, ValidatorWitnessSig, WitnessPacket};

#[derive(Clone, Debug)]
pub struct WitnessConfig {
    /// Window half-width in blocks.
    pub pending_block_threshold: u64,

    /// Cap on queued packets per future block.
    pub max_pending_witnesses: usize,

    /// Pre-published trusted authority keys.
    pub trusted_keys: Vec<Buf32>,

    /// Trusted attestations a block needs before we call it witnessed.
    pub min_trusted_witnesses: usize,

    /// GC sweep interval.
    pub gc_interval: Duration,
}

/// Node signing identity: always a validator key, plus the trusted key when
/// this node is an authority member.
pub struct NodeKeys {
    pub validator: Keypair,
    pub trusted: Option<Keypair>,
}

/// What became of a submitted packet.  `Violation` marks a checksum
/// mismatch on a block we could fully verify; sessions count those and cut
/// peers that repeat them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketVerdict {
    Accepted,
    Ignored,
    Violation,
}

pub struct WitnessManager {
    witness_ops: Arc<WitnessOps>,
    block_ops: Arc<BlockDataOps>,
    config: WitnessConfig,
    keys: NodeKeys,

    current_height: u64,

    /// Packets for blocks we haven't committed yet, keyed by block.
    pending_verification: BTreeMap<u64, Vec<WitnessPacket>>,

    /// Trusted identities already seen per block, for dedup and replay
    /// suppression.
    known_trusted: HashMap<u64, HashSet<Buf64>>,

    /// Outbound packets for the p2p worker to gossip.
    outbound_tx: mpsc::Sender<WitnessPacket>,
}

impl WitnessManager {
    pub fn new(
        witness_ops: Arc<WitnessOps>,
        block_ops: Arc<BlockDataOps>,
        config: WitnessConfig,
        keys: NodeKeys,
        outbound_tx: mpsc::Sender<WitnessPacket>,
    ) -> Self {
        Self {
            witness_ops,
            block_ops,
            config,
            keys,
            current_height: 0,
            pending_verification: BTreeMap::new(),
            known_trusted: HashMap::new(),
            outbound_tx,
        }
    }

    /// Signs and broadcasts our own attestation for a locally committed
    /// block, then drains any queued packets that became verifiable.
    pub async fn on_local_block_processed(
        &mut self,
        height: u64,
        block_hash: Buf32,
        prev_hash: Buf32,
        checksum_root: Buf32,
        prev_checksum: Buf32,
    ) -> anyhow::Result<()> {
        self.current_height = height;
        let digest = compute_witness_digest(&block_hash, &prev_hash, &checksum_root, &prev_checksum);

        let validator_pubkey = pubkey_buf(&self.keys.validator);
        let validator_sig = ValidatorWitnessSig {
            identity: identity_of(&validator_pubkey),
            signature: sign_digest(&self.keys.validator, &digest),
            pubkey: validator_pubkey,
        };

        let mut trusted_witnesses = Vec::new();
        if let Some(trusted) = &self.keys.trusted {
            let trusted_pubkey = pubkey_buf(trusted);
            trusted_witnesses.push(TrustedWitnessSig {
                identity: identity_of(&trusted_pubkey),
                signature: sign_digest(trusted, &digest),
            });
        }

        self.persist_validator_witness(height, &validator_sig).await?;

        let packet = WitnessPacket {
            block_number: height,
            block_hash,
            checksum_hash: checksum_root,
            validator_witnesses: vec![validator_sig],
            trusted_witnesses,
        };
        if self.outbound_tx.send(packet).await.is_err() {
            warn!("p2p outbound closed, dropping own attestation");
        }

        self.drain_pending().await;
        Ok(())
    }

    /// Routes a peer's packet by its distance to our committed tip.
    pub async fn on_remote_attestation(&mut self, packet: WitnessPacket) -> PacketVerdict {
        let block = packet.block_number;

        if block > self.current_height {
            let queue = self.pending_verification.entry(block).or_default();
            if queue.len() >= self.config.max_pending_witnesses {
                trace!(%block, "pending witness queue full, dropping packet");
                return PacketVerdict::Ignored;
            }
            queue.push(packet);
            return PacketVerdict::Accepted;
        }

        if block + self.config.pending_block_threshold < self.current_height {
            trace!(%block, current = %self.current_height, "witness packet too old, dropping");
            return PacketVerdict::Ignored;
        }

        match self.verify_packet(packet).await {
            Ok(verdict) => verdict,
            Err(e) => {
                debug!(%block, err = %e, "witness packet dropped");
                PacketVerdict::Ignored
            }
        }
    }

    /// Serves stored witnesses for a block, both trusted and validator
    /// sets.
    pub async fn request_witnesses(&self, block_number: u64) -> Vec<BlockWitness> {
        self.witness_ops
            .get_witnesses_for_block_async(block_number)
            .await
            .unwrap_or_default()
    }

    /// Clears tracked state above the fork after a reorg; stored rows were
    /// already deleted by the indexer's revert.
    pub fn on_reorg(&mut self, from_height: u64) {
        self.pending_verification.retain(|blk, _| *blk < from_height);
        self.known_trusted.retain(|blk, _| *blk < from_height);
        self.current_height = from_height.saturating_sub(1);
    }

    /// Drops tracked trusted identities that fell out of the window.
    pub fn gc(&mut self) {
        let threshold = self.config.pending_block_threshold;
        let current = self.current_height;
        self.known_trusted
            .retain(|blk, _| current.saturating_sub(*blk) <= threshold);
    }

    async fn drain_pending(&mut self) {
        let ready: Vec<u64> = self
            .pending_verification
            .range(..=self.current_height)
            .map(|(k, _)| *k)
            .collect();
        for block in ready {
            if let Some(packets) = self.pending_verification.remove(&block) {
                for packet in packets {
                    if let Err(e) = self.verify_packet(packet).await {
                        debug!(%block, err = %e, "queued witness packet dropped");
                    }
                }
            }
        }
    }


    /// The verification pipeline.  Errors are quiet drop reasons; a
    /// checksum mismatch on an otherwise-verifiable block comes back as a
    /// [`PacketVerdict::Violation`] so the session layer can penalize the
    /// peer.
    async fn verify_packet(&mut self, mut packet: WitnessPacket) -> anyhow::Result<PacketVerdict> {
        let block = packet.block_number;

        // Strip trusted identities we've already accepted for this block.
        if let Some(known) = self.known_trusted.get(&block) {
            packet
                .trusted_witnesses
                .retain(|w| !known.contains(&w.identity));
        }
        if packet.is_empty() {
            anyhow::bail!("nothing new in packet");
        }

        // We need the stored block to verify anything.
        let Some(stored) = self.block_ops.get_block_at_async(block).await? else {
            anyhow::bail!("no stored block");
        };

        // Our own proofs must be in place before we judge anyone; while
        // still syncing this range, drop without penalty.
        if !stored.has_checksum() || stored.checksum_proofs().is_empty() {
            anyhow::bail!("local proofs not yet verifiable");
        }

        // Claimed checksum must match ours exactly.
        if packet.checksum_hash != *stored.checksum_root() {
            error!(
                %block,
                theirs = %packet.checksum_hash,
                ours = %stored.checksum_root(),
                "attestation checksum mismatch, possible data integrity issue"
            );
            return Ok(PacketVerdict::Violation);
        }

        let prev_checksum = match block.checked_sub(1) {
            Some(prev) => self
                .block_ops
                .get_block_at_async(prev)
                .await?
                .map(|b| *b.checksum_root())
                .unwrap_or_default(),
            None => Buf32::zero(),
        };
        let digest = compute_witness_digest(
            stored.block_hash(),
            stored.prev_hash(),
            stored.checksum_root(),
            &prev_checksum,
        );

        // Signature filtering.
        let valid_validators: Vec<ValidatorWitnessSig> = packet
            .validator_witnesses
            .into_iter()
            .filter(|w| {
                w.identity == identity_of(&w.pubkey)
                    && verify_signature(&digest, &w.signature, &w.pubkey)
            })
            .collect();

        let valid_trusted: Vec<TrustedWitnessSig> = packet
            .trusted_witnesses
            .into_iter()
            .filter(|w| {
                self.config.trusted_keys.iter().any(|key| {
                    w.identity == identity_of(key)
                        && verify_signature(&digest, &w.signature, key)
                })
            })
            .collect();

        if valid_validators.is_empty() && valid_trusted.is_empty() {
            anyhow::bail!("no verifiable signatures");
        }

        // Persist and track, then rebroadcast the fresh trusted set under
        // our validator signature only.
        for witness in &valid_validators {
            self.persist_validator_witness(block, witness).await?;
        }
        for witness in &valid_trusted {
            self.persist_trusted_witness(block, witness).await?;
            self.known_trusted
                .entry(block)
                .or_default()
                .insert(witness.identity);
        }

        let trusted_count = self
            .known_trusted
            .get(&block)
            .map(|set| set.len())
            .unwrap_or(0);
        if trusted_count == self.config.min_trusted_witnesses {
            info!(%block, %trusted_count, "block reached the trusted witness threshold");
        }

        if !valid_trusted.is_empty() {
            let validator_pubkey = pubkey_buf(&self.keys.validator);
            let own_sig = ValidatorWitnessSig {
                identity: identity_of(&validator_pubkey),
                signature: sign_digest(&self.keys.validator, &digest),
                pubkey: validator_pubkey,
            };
            let rebroadcast = WitnessPacket {
                block_number: block,
                block_hash: *stored.block_hash(),
                checksum_hash: *stored.checksum_root(),
                validator_witnesses: vec![own_sig],
                trusted_witnesses: valid_trusted,
            };
            if self.outbound_tx.send(rebroadcast).await.is_err() {
                warn!("p2p outbound closed, dropping rebroadcast");
            }
        }

        Ok(PacketVerdict::Accepted)
    }

    async fn persist_validator_witness(
        &self,
        block: u64,
        sig: &ValidatorWitnessSig,
    ) -> anyhow::Result<()> {
        self.witness_ops
            .insert_witness_async(BlockWitness {
                block_number: block,
                identity: sig.identity,
                signature: sig.signature,
                validator_pubkey: Some(sig.pubkey),
                timestamp: now_millis(),
                proofs: None,
            })
            .await?;
        Ok(())
    }

    async fn persist_trusted_witness(
        &self,
        block: u64,
        sig: &TrustedWitnessSig,
    ) -> anyhow::Result<()> {
        self.witness_ops
            .insert_witness_async(BlockWitness {
                block_number: block,
                identity: sig.identity,
                signature: sig.signature,
                validator_pubkey: None,
                timestamp: now_millis(),
                proofs: None,
            })
            .await?;
        Ok(())
    }
}

/// Handle for the p2p worker: inbound packets and sync reads.
#[derive(Clone)]
pub struct WitnessHandle {
    packet_tx: mpsc::Sender<InboundPacket>,
    witness_ops: Arc<WitnessOps>,
}

struct InboundPacket {
    packet: WitnessPacket,
    verdict_tx: tokio::sync::oneshot::Sender<PacketVerdict>,
}

impl WitnessHandle {
    /// Submits a peer packet and reports what became of it, so the session
    /// can escalate repeated violations into a disconnect.
    pub async fn submit_packet(&self, packet: WitnessPacket) -> PacketVerdict {
        let (verdict_tx, verdict_rx) = tokio::sync::oneshot::channel();
        let inbound = InboundPacket { packet, verdict_tx };
        if self.packet_tx.send(inbound).await.is_err() {
            warn!("witness manager gone, dropping inbound packet");
            return PacketVerdict::Ignored;
        }
        verdict_rx.await.unwrap_or(PacketVerdict::Ignored)
    }

    /// Read-only witness fetch for sync responses.
    pub async fn witnesses_for_block(&self, block_number: u64) -> Vec<BlockWitness> {
        self.witness_ops
            .get_witnesses_for_block_async(block_number)
            .await
            .unwrap_or_default()
    }
}

/// Spawns the witness manager task.  `chain_events` is the indexer's
/// broadcast feed; `outbound_tx` feeds the p2p gossip.
#[allow(clippy::too_many_arguments)]
pub fn start_witness_manager(
    executor: &TaskExecutor,
    witness_ops: Arc<WitnessOps>,
    block_ops: Arc<BlockDataOps>,
    config: WitnessConfig,
    keys: NodeKeys,
    chain_events: broadcast::Receiver<ChainEvent>,
    outbound_tx: mpsc::Sender<WitnessPacket>,
    shutdown: ShutdownGuard,
) -> WitnessHandle {
    let (packet_tx, packet_rx) = mpsc::channel::<InboundPacket>(256);
    let handle = WitnessHandle {
        packet_tx,
        witness_ops: witness_ops.clone(),
    };

    let manager = WitnessManager::new(witness_ops, block_ops, config, keys, outbound_tx);
    executor.spawn_critical_async("witness-manager", async move {
        witness_manager_task(manager, chain_events, packet_rx, shutdown).await
    });

    handle
}

async fn witness_manager_task(
    mut manager: WitnessManager,
    mut chain_events: broadcast::Receiver<ChainEvent>,
    mut packet_rx: mpsc::Receiver<InboundPacket>,
    shutdown: ShutdownGuard,
) -> anyhow::Result<()> {
    let mut gc_interval = tokio::time::interval(manager.config.gc_interval);
    let mut shutdown_rx = shutdown.clone();
    info!("witness manager up");

    loop {
        tokio::select! {
            _ = shutdown_rx.wait_for_shutdown() => {
                info!("witness manager shutting down");
                return Ok(());
            }

            event = chain_events.recv() => {
                match event {
                    Ok(ChainEvent::BlockCommitted {
                        height, block_hash, prev_hash, checksum_root, prev_checksum,
                    }) => {
                        if let Err(e) = manager
                            .on_local_block_processed(
                                height, block_hash, prev_hash, checksum_root, prev_checksum,
                            )
                            .await
                        {
                            error!(err = %e, "failed to process local block attestation");
                        }
                    }
                    Ok(ChainEvent::Reorg { from_height, .. }) => {
                        manager.on_reorg(from_height);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%skipped, "witness manager lagged the chain event feed");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("chain event feed closed, witness manager exiting");
                        return Ok(());
                    }
                }
            }

            Some(inbound) = packet_rx.recv() => {
                let verdict = manager.on_remote_attestation(inbound.packet).await;
                let _ = inbound.verdict_tx.send(verdict);
            }

            _ = gc_interval.tick() => {
                manager.gc();
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use secp256k1::{Secp256k1, SecretKey};
    use tapnet_db::traits::NodeDatabase;
    use tapnet_primitives::block::BlockRecord;
    use tapnet_rocksdb::test_utils::get_common_db;

    use super::*;

    fn keypair(seed: u8) -> Keypair {
        let secp = Secp256k1::new();
        Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[seed; 32]).unwrap())
    }

    struct Fixture {
        manager: WitnessManager,
        outbound_rx: mpsc::Receiver<WitnessPacket>,
        block_ops: Arc<BlockDataOps>,
        witness_ops: Arc<WitnessOps>,
    }

    fn fixture(trusted_keys: Vec<Buf32>, own_trusted: Option<Keypair>) -> Fixture {
        let pool = threadpool::Builder::new().num_threads(2).build();
        let db = get_common_db();
        let block_ops = Arc::new(
            tapnet_storage::ops::block::Context::new(db.block_db().clone())
                .into_ops(pool.clone()),
        );
        let witness_ops = Arc::new(
            tapnet_storage::ops::witness::Context::new(db.witness_db().clone()).into_ops(pool),
        );
        let (outbound_tx, outbound_rx) = mpsc::channel(16);

        let manager = WitnessManager::new(
            witness_ops.clone(),
            block_ops.clone(),
            WitnessConfig {
                pending_block_threshold: 10,
                max_pending_witnesses: 50,
                trusted_keys,
                min_trusted_witnesses: 1,
                gc_interval: Duration::from_secs(60),
            },
            NodeKeys {
                validator: keypair(1),
                trusted: own_trusted,
            },
            outbound_tx,
        );
        Fixture {
            manager,
            outbound_rx,
            block_ops,
            witness_ops,
        }
    }

    async fn store_block(block_ops: &Arc<BlockDataOps>, height: u64, checksum: Buf32) -> BlockRecord {
        let record = BlockRecord::new(
            height,
            Buf32::from([height as u8 + 1; 32]),
            Buf32::from([height as u8; 32]),
            Buf32::from([7; 32]),
            Buf32::zero(),
            Buf32::zero(),
            checksum,
            vec![checksum.as_slice().to_vec()],
            0,
            vec![],
        );
        block_ops.put_header_async(record.clone()).await.unwrap();
        record
    }

    fn packet_for(
        stored: &BlockRecord,
        prev_checksum: Buf32,
        signer: &Keypair,
        as_trusted: bool,
    ) -> WitnessPacket {
        let digest = compute_witness_digest(
            stored.block_hash(),
            stored.prev_hash(),
            stored.checksum_root(),
            &prev_checksum,
        );
        let pubkey = pubkey_buf(signer);
        let mut packet = WitnessPacket {
            block_number: stored.height(),
            block_hash: *stored.block_hash(),
            checksum_hash: *stored.checksum_root(),
            validator_witnesses: vec![],
            trusted_witnesses: vec![],
        };
        if as_trusted {
            packet.trusted_witnesses.push(TrustedWitnessSig {
                identity: identity_of(&pubkey),
                signature: sign_digest(signer, &digest),
            });
        } else {
            packet.validator_witnesses.push(ValidatorWitnessSig {
                identity: identity_of(&pubkey),
                signature: sign_digest(signer, &digest),
                pubkey,
            });
        }
        packet
    }

    #[tokio::test]
    async fn test_valid_validator_witness_is_stored() {
        let mut fx = fixture(vec![], None);
        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        fx.manager.current_height = 5;

        let packet = packet_for(&stored, Buf32::zero(), &keypair(2), false);
        fx.manager.on_remote_attestation(packet).await;

        let witnesses = fx.witness_ops.get_witnesses_for_block_async(5).await.unwrap();
        assert_eq!(witnesses.len(), 1);
        assert!(!witnesses[0].is_trusted());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_a_violation() {
        let mut fx = fixture(vec![], None);
        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        fx.manager.current_height = 5;

        let mut packet = packet_for(&stored, Buf32::zero(), &keypair(2), false);
        packet.checksum_hash = Buf32::from([0xbb; 32]);
        let verdict = fx.manager.on_remote_attestation(packet).await;

        assert_eq!(verdict, PacketVerdict::Violation);
        assert!(fx
            .witness_ops
            .get_witnesses_for_block_async(5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unverifiable_block_is_not_a_violation() {
        // Same mismatch, but we have no proofs for the block yet; a syncing
        // node must not penalize the peer.
        let mut fx = fixture(vec![], None);
        let stored = store_block(&fx.block_ops, 5, Buf32::zero()).await;
        fx.manager.current_height = 5;

        let mut packet = packet_for(&stored, Buf32::zero(), &keypair(2), false);
        packet.checksum_hash = Buf32::from([0xbb; 32]);
        let verdict = fx.manager.on_remote_attestation(packet).await;

        assert_eq!(verdict, PacketVerdict::Ignored);
    }

    #[tokio::test]
    async fn test_future_packet_queues_until_commit() {
        let mut fx = fixture(vec![], None);
        fx.manager.current_height = 3;

        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        let prev = store_block(&fx.block_ops, 4, Buf32::from([8; 32])).await;
        let packet = packet_for(&stored, *prev.checksum_root(), &keypair(2), false);
        fx.manager.on_remote_attestation(packet).await;

        assert!(fx
            .witness_ops
            .get_witnesses_for_block_async(5)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(fx.manager.pending_verification.len(), 1);

        // Catching up makes the queued packet verifiable.
        fx.manager
            .on_local_block_processed(
                5,
                *stored.block_hash(),
                *stored.prev_hash(),
                *stored.checksum_root(),
                *prev.checksum_root(),
            )
            .await
            .unwrap();

        let witnesses = fx.witness_ops.get_witnesses_for_block_async(5).await.unwrap();
        // Our own attestation plus the queued peer's.
        assert_eq!(witnesses.len(), 2);
        assert!(fx.manager.pending_verification.is_empty());
    }

    #[tokio::test]
    async fn test_stale_packet_dropped() {
        let mut fx = fixture(vec![], None);
        fx.manager.current_height = 100;

        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        let packet = packet_for(&stored, Buf32::zero(), &keypair(2), false);
        fx.manager.on_remote_attestation(packet).await;

        assert!(fx
            .witness_ops
            .get_witnesses_for_block_async(5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_pending_queue_cap() {
        let mut fx = fixture(vec![], None);
        fx.manager.current_height = 0;
        fx.manager.config.max_pending_witnesses = 3;

        for i in 0..10u8 {
            let packet = WitnessPacket {
                block_number: 50,
                block_hash: Buf32::from([i; 32]),
                checksum_hash: Buf32::zero(),
                validator_witnesses: vec![],
                trusted_witnesses: vec![TrustedWitnessSig {
                    identity: Buf64::from([i; 64]),
                    signature: Buf64::zero(),
                }],
            };
            fx.manager.on_remote_attestation(packet).await;
        }
        assert_eq!(fx.manager.pending_verification[&50].len(), 3);
    }

    #[tokio::test]
    async fn test_trusted_rebroadcast_hides_own_trusted_identity() {
        // This node IS a trusted authority; a peer relays another authority
        // signature. The rebroadcast must be signed with our validator key
        // only.
        let authority = keypair(3);
        let our_trusted = keypair(4);
        let trusted_keys = vec![pubkey_buf(&authority), pubkey_buf(&our_trusted)];
        let mut fx = fixture(trusted_keys, Some(our_trusted.clone()));

        let prev = store_block(&fx.block_ops, 4, Buf32::from([8; 32])).await;
        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        fx.manager.current_height = 5;

        let packet = packet_for(&stored, *prev.checksum_root(), &authority, true);
        fx.manager.on_remote_attestation(packet).await;

        let rebroadcast = fx.outbound_rx.try_recv().expect("rebroadcast expected");
        let our_trusted_identity = identity_of(&pubkey_buf(&our_trusted));

        assert!(
            !rebroadcast
                .trusted_witnesses
                .iter()
                .any(|w| w.identity == our_trusted_identity),
            "rebroadcast must not carry this node's trusted identity"
        );
        let our_validator_identity = identity_of(&pubkey_buf(&keypair(1)));
        assert!(
            rebroadcast
                .validator_witnesses
                .iter()
                .any(|w| w.identity == our_validator_identity),
            "rebroadcast is signed with the validator key"
        );
    }

    #[tokio::test]
    async fn test_replayed_trusted_identity_stripped() {
        let authority = keypair(3);
        let mut fx = fixture(vec![pubkey_buf(&authority)], None);

        let prev = store_block(&fx.block_ops, 4, Buf32::from([8; 32])).await;
        let stored = store_block(&fx.block_ops, 5, Buf32::from([9; 32])).await;
        fx.manager.current_height = 5;

        let packet = packet_for(&stored, *prev.checksum_root(), &authority, true);
        fx.manager.on_remote_attestation(packet.clone()).await;
        let first = fx.witness_ops.get_witnesses_for_block_async(5).await.unwrap();

        // Same identity again: stripped in step 1, nothing new stored and
        // no second rebroadcast.
        fx.manager.on_remote_attestation(packet).await;
        let second = fx.witness_ops.get_witnesses_for_block_async(5).await.unwrap();
        assert_eq!(first.len(), second.len());
        let _ = fx.outbound_rx.try_recv().expect("first rebroadcast");
        assert!(fx.outbound_rx.try_recv().is_err(), "no replay rebroadcast");
    }

    #[tokio::test]
    async fn test_gc_trims_old_tracked_identities() {
        let mut fx = fixture(vec![], None);
        fx.manager.known_trusted.insert(5, HashSet::new());
        fx.manager.known_trusted.insert(90, HashSet::new());
        fx.manager.current_height = 100;

        fx.manager.gc();

        assert!(!fx.manager.known_trusted.contains_key(&5));
        assert!(fx.manager.known_trusted.contains_key(&90));
    }
}
