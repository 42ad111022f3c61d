//! Attestation consensus: collecting, verifying and rebroadcasting
//! validator signatures over committed block checksums.

pub mod crypto;
pub mod manager;
pub mod packet;

pub use manager::{
    start_witness_manager, PacketVerdict, WitnessConfig, WitnessHandle, WitnessManager,
};
pub use packet::{TrustedWitnessSig, ValidatorWitnessSig, WitnessPacket};
