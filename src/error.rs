//! Error types for calls made to peers.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("cannot open channel to {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("call did not complete within {0:?}")]
    Timeout(Duration),

    #[error("peer answered with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed reply: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CallError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            CallError::Status(status.as_u16())
        } else {
            CallError::Transport(e.to_string())
        }
    }
}
