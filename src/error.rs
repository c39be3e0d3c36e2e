// src/error.rs
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by signer discovery, signer methods and the hosted frame channel.
///
/// Foreign-origin and malformed frame messages are never turned into errors;
/// they are dropped at the trust boundary.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A signer method was called on a missing, disconnected or logged-out signer.
    #[error("Wallet Not Connected")]
    NotConnected,

    /// The wallet behind a signer lacks the requested capability.
    #[error("Wallet does not support \"{0}\" method")]
    Unsupported(&'static str),

    /// The user declined the request in the hosted wallet UI.
    #[error("{0}")]
    Rejected(String),

    /// The pending request was dropped before any reply arrived.
    #[error("Request cancelled before the hosted wallet replied")]
    Cancelled,

    #[error("Timed out waiting for \"{0}\" reply from the hosted wallet")]
    Timeout(String),

    #[error("Frame transport error: {0}")]
    Transport(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ConnectError {
    /// True for the user-rejection branch, which UIs show as a message instead of a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ConnectError::Rejected(_))
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(e: reqwest::Error) -> Self {
        ConnectError::Rpc(e.to_string())
    }
}
