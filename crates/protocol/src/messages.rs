use serde::{Deserialize, Serialize};

use crate::constants::MessageType;
use crate::types::{CompressionMode, Credential, ResponseCode};

// ---------------------------------------------------------------------------
// File broadcast request
// ---------------------------------------------------------------------------

/// Everything a node needs to place one block, except the block bytes.
///
/// Ownership, mode and credential are identical for every block of a
/// transfer; the block fields change per send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBcastHeader {
    /// Destination path on the target nodes.
    pub fname: String,
    pub block_no: u32,
    pub last_block: bool,
    pub force: bool,
    pub compress: CompressionMode,
    pub modes: u32,
    pub uid: u32,
    pub user_name: String,
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    /// Bytes in the (possibly compressed) block payload.
    pub block_len: u32,
    /// Bytes the payload expands to.
    pub uncomp_len: u32,
    pub cred: Credential,
}

/// One block on its way to the target nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBcastMessage {
    pub header: FileBcastHeader,
    pub block: Vec<u8>,
}

impl FileBcastMessage {
    pub fn block_no(&self) -> u32 {
        self.header.block_no
    }

    pub fn is_last(&self) -> bool {
        self.header.last_block
    }
}

/// Typed JSON header of a request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub header: FileBcastHeader,
}

impl RequestFrame {
    pub fn file_bcast(header: FileBcastHeader) -> Self {
        Self {
            msg_type: MessageType::RequestFileBcast,
            header,
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Outcome of one block send for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReply {
    pub node_name: String,
    pub code: ResponseCode,
}

impl NodeReply {
    pub fn new(node_name: impl Into<String>, code: ResponseCode) -> Self {
        Self {
            node_name: node_name.into(),
            code,
        }
    }

    pub fn success(node_name: impl Into<String>) -> Self {
        Self::new(node_name, ResponseCode::SUCCESS)
    }
}
