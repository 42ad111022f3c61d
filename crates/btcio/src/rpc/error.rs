use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure; the caller should treat the slot as empty
    /// and retry later.
    #[error("network: {0}")]
    Network(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    /// Error object returned by the server.
    #[error("rpc server returned error '{message}' (code {code})")]
    Server { code: i64, message: String },

    #[error("server returned neither result nor error")]
    MissingResult,

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
