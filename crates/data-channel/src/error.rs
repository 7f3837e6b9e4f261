//! Error types for the data channel.

use filebcast_broadcast::BroadcastError;

/// Errors produced by the TCP data channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{what} too large: {len} bytes (max {max})")]
    FrameTooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("cannot resolve node {node}: {reason}")]
    UnknownNode { node: String, reason: String },

    #[error("no node answered before the deadline")]
    Timeout,
}

impl From<DataChannelError> for BroadcastError {
    fn from(e: DataChannelError) -> Self {
        BroadcastError::Transport(e.to_string())
    }
}
