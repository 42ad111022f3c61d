//! Protocol v1 packets.  A closed set; anything that doesn't decode into
//! this enum after authentication disconnects the peer.

use borsh::{BorshDeserialize, BorshSerialize};
use tapnet_primitives::witness::BlockWitness;
use tapnet_witness::WitnessPacket;

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum Packet {
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },

    /// Ask the peer for other peer addresses.
    Discover,
    DiscoveryResponse {
        peers: Vec<String>,
    },

    /// Attestation gossip.
    BlockHeaderWitness(WitnessPacket),

    /// Pull historic witnesses for a half-open block range.
    SyncBlockHeadersRequest {
        start: u64,
        end: u64,
    },
    SyncBlockHeadersResponse {
        witnesses: Vec<(u64, Vec<BlockWitness>)>,
    },

    /// Mempool gossip: raw transaction bytes.
    BroadcastTransaction {
        raw: Vec<u8>,
        psbt: bool,
    },
}

impl Packet {
    /// Wire opcode, for logging.
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Ping { .. } => 0,
            Packet::Pong { .. } => 1,
            Packet::Discover => 2,
            Packet::DiscoveryResponse { .. } => 3,
            Packet::BlockHeaderWitness(_) => 4,
            Packet::SyncBlockHeadersRequest { .. } => 5,
            Packet::SyncBlockHeadersResponse { .. } => 6,
            Packet::BroadcastTransaction { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet::SyncBlockHeadersRequest { start: 5, end: 10 };
        let bytes = borsh::to_vec(&packet).unwrap();
        let back: Packet = borsh::from_slice(&bytes).unwrap();
        assert_eq!(packet, back);
    }

    #[test]
    fn test_unknown_opcode_fails_decode() {
        // Discriminant 250 is outside the closed set.
        let res = borsh::from_slice::<Packet>(&[250, 0, 0, 0]);
        assert!(res.is_err(), "unknown opcode must not decode");
    }
}
