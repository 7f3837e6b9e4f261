use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Block size used when the caller does not request one (512 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

/// Largest block size accepted (64 MiB).
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Largest encoded block payload: a `MAX_BLOCK_SIZE` block plus the
/// worst-case growth of zlib or LZ4 on incompressible input.
pub const MAX_PAYLOAD_LEN: usize = MAX_BLOCK_SIZE + MAX_BLOCK_SIZE / 128 + 64 * 1024;

/// Length of a generated transfer credential in bytes.
pub const CREDENTIAL_LEN: usize = 32;

/// Upper bound on fanout width.
///
/// Blocks can be huge messages, so only this many nodes are addressed
/// at once by a single transport level.
pub const MAX_FANOUT: usize = 8;

/// Largest input slice fed to a zlib stream in one call (256 KiB).
pub const ZLIB_CHUNK_SIZE: usize = 256 * 1024;

/// Extra output capacity reserved for zlib worst-case expansion.
pub const ZLIB_OUTPUT_SLACK: usize = 1024;

/// Timeout for one fanout round when the caller does not set one.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP port the node-side receiver listens on by default.
pub const DEFAULT_NODE_PORT: u16 = 6818;

/// RPC message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// One block of a broadcast file (sender -> node).
    #[serde(rename = "request_file_bcast")]
    RequestFileBcast,
    /// Single return code (node -> sender).
    #[serde(rename = "response_return_code")]
    ResponseReturnCode,
}

impl MessageType {
    /// Name used in diagnostics, e.g. `REQUEST_FILE_BCAST(node1): ...`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::RequestFileBcast => "REQUEST_FILE_BCAST",
            MessageType::ResponseReturnCode => "RESPONSE_RETURN_CODE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
