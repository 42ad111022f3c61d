//! Encrypted peer sessions for the overlay validator network.

pub mod encryptem;
pub mod errors;
pub mod framing;
pub mod packet;
pub mod session;
pub mod worker;

pub use errors::SessionError;
pub use packet::Packet;
pub use worker::{start_p2p_worker, P2pContext};
