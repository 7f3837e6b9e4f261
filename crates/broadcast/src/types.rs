//! Data types for the broadcast flow.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use filebcast_protocol::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_RPC_TIMEOUT, MAX_BLOCK_SIZE};
use filebcast_protocol::hostlist;
use filebcast_protocol::{CompressionMode, Credential, JobStepId, ProtocolError, ResponseCode};

/// Settings of one broadcast.
///
/// Zero values select the defaults. Fixed for the whole run, except that
/// `compress` drops to `None` when the requested codec is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastParameters {
    /// Bytes per block; 0 = 512 KiB. Capped to the file size and to
    /// `MAX_BLOCK_SIZE`.
    pub block_size: usize,
    pub compress: CompressionMode,
    /// Nodes addressed at once; 0 = maximum.
    pub fanout: usize,
    /// Overwrite existing destination files.
    pub force: bool,
    pub job_id: u32,
    pub step_id: Option<u32>,
    /// Carry the source's access and modification times.
    pub preserve: bool,
    /// Per-round timeout in seconds; 0 = default.
    pub timeout_secs: u64,
    pub verbose: u8,
    pub src_path: PathBuf,
    /// Destination path on every target node.
    pub dst_path: String,
}

impl BroadcastParameters {
    pub fn job_step(&self) -> JobStepId {
        JobStepId {
            job_id: self.job_id,
            step_id: self.step_id,
        }
    }

    /// Block size actually used for a file of `file_len` bytes.
    pub fn effective_block_size(&self, file_len: u64) -> usize {
        let requested = if self.block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            self.block_size
        };
        let cap = file_len.min(MAX_BLOCK_SIZE as u64) as usize;
        requested.min(cap)
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            DEFAULT_RPC_TIMEOUT
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }
}

/// What the control plane hands out for one job or step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCredential {
    pub credential: Credential,
    /// Host list expression, e.g. `tux[01-16]`.
    pub node_list: String,
    /// `node_list` expanded, in order.
    pub node_names: Vec<String>,
}

impl TransferCredential {
    /// Builds a credential for the nodes named by `node_list`.
    pub fn from_node_list(
        credential: Credential,
        node_list: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let node_list = node_list.into();
        let node_names = hostlist::expand(&node_list)?;
        Ok(Self {
            credential,
            node_list,
            node_names,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }
}

/// Lifecycle of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastState {
    #[default]
    Init,
    Streaming,
    Done,
    Aborted,
}

/// Progress event emitted during a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    /// The requested codec could not be used; blocks go out uncompressed.
    Downgraded {
        requested: CompressionMode,
        reason: String,
    },
    /// Every node acknowledged a block.
    BlockSent {
        block_no: u32,
        payload_len: usize,
        uncompressed_len: usize,
        last: bool,
    },
    /// The last block was acknowledged everywhere.
    Completed { blocks: u32 },
    /// The broadcast stopped. `block_no` is the failing block, if one was
    /// being sent.
    Aborted {
        block_no: Option<u32>,
        code: ResponseCode,
        error: String,
    },
}

/// Compression outcome, reported when a codec was active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSummary {
    pub uncompressed: u64,
    pub compressed: u64,
    /// Signed: negative when compression expanded the data.
    pub percent_saved: i64,
    pub elapsed: Duration,
}

impl fmt::Display for CompressionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File compressed from {} to {} ({} percent) in {} usec",
            self.uncompressed,
            self.compressed,
            self.percent_saved,
            self.elapsed.as_micros()
        )
    }
}

/// Result of a successful broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastReport {
    pub blocks: u32,
    /// Source bytes delivered.
    pub bytes: u64,
    /// Bytes put on the wire per node.
    pub payload_bytes: u64,
    /// Compression actually applied.
    pub compression: CompressionMode,
    pub nodes: usize,
    pub summary: Option<CompressionSummary>,
}
