//! Wire protocol types for block-streamed file broadcast.
//!
//! Shared between the sending engine, the TCP data channel and the
//! node-side receiver.

pub mod constants;
pub mod hostlist;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use messages::{FileBcastHeader, FileBcastMessage, NodeReply, RequestFrame};
pub use types::{CompressionMode, Credential, JobStepId, ResponseCode};

/// Errors produced while parsing protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid compression mode: {0}")]
    InvalidCompression(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("invalid host list: {0}")]
    InvalidHostList(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
