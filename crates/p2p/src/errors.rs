use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer did not authenticate in time")]
    AuthTimeout,

    /// Undecodable or out-of-protocol packet after authentication; the
    /// session is cut.
    #[error("bad packet: {0}")]
    BadPacket(String),

    #[error("envelope rejected: {0}")]
    Crypto(&'static str),

    #[error("peer closed the connection")]
    Closed,
}
