//! Source side of a file broadcast: the memory-mapped source file and the
//! per-block compression codecs that slice it into wire blocks.

pub mod codec;
mod source;
mod stats;
mod types;

use std::path::PathBuf;

use filebcast_protocol::CompressionMode;

pub use codec::{BlockCodec, Capabilities, CodecDowngrade, CodecSelection, select_codec};
pub use source::{SourceFile, username_for_uid};
pub use stats::CompressionStats;
pub use types::{Block, EncodedBlock};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("can't open `{}`: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't mmap file `{}`: {source}", path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{mode} compression error: {message}")]
    Compression {
        mode: CompressionMode,
        message: String,
    },
}

impl TransferError {
    pub(crate) fn compression(mode: CompressionMode, message: impl Into<String>) -> Self {
        TransferError::Compression {
            mode,
            message: message.into(),
        }
    }
}
