//! Broadcast error types.

use filebcast_protocol::{JobStepId, ResponseCode};
use filebcast_transfer::TransferError;

/// Errors that end a broadcast.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("{scope} lookup error: {message}")]
    CredentialLookup { scope: String, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("block {block_no} failed: {code}")]
    NodeTransfer { block_no: u32, code: ResponseCode },
}

impl BroadcastError {
    /// Lookup failure for `id`, worded the way the control plane scopes it.
    pub fn lookup(id: JobStepId, message: impl Into<String>) -> Self {
        let scope = match id.step_id {
            Some(step) => format!("step ID {}.{step}", id.job_id),
            None => format!("Slurm job ID {}", id.job_id),
        };
        BroadcastError::CredentialLookup {
            scope,
            message: message.into(),
        }
    }

    /// The single return code that stands for this failure.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            BroadcastError::Transfer(_) | BroadcastError::CredentialLookup { .. } => {
                ResponseCode::ERROR
            }
            BroadcastError::Transport(_) => ResponseCode::CONNECTION_ERROR,
            BroadcastError::NodeTransfer { code, .. } => *code,
        }
    }
}
