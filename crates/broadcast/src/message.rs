use filebcast_protocol::{Credential, FileBcastHeader, FileBcastMessage};
use filebcast_transfer::{Block, SourceFile};

use crate::types::{BroadcastParameters, TransferCredential};

/// The per-transfer half of every block message.
///
/// Destination, ownership, permissions and credential are fixed when the
/// envelope is built; [`BcastEnvelope::message`] only adds block fields.
#[derive(Debug, Clone, PartialEq)]
pub struct BcastEnvelope {
    fname: String,
    cred: Credential,
    modes: u32,
    uid: u32,
    user_name: String,
    gid: u32,
    atime: Option<i64>,
    mtime: Option<i64>,
    force: bool,
}

impl BcastEnvelope {
    pub fn new(
        source: &SourceFile,
        credential: &TransferCredential,
        params: &BroadcastParameters,
    ) -> Self {
        let (atime, mtime) = if params.preserve {
            (Some(source.atime()), Some(source.mtime()))
        } else {
            (None, None)
        };
        Self {
            fname: params.dst_path.clone(),
            cred: credential.credential.clone(),
            modes: source.mode(),
            uid: source.uid(),
            user_name: source.owner_name(),
            gid: source.gid(),
            atime,
            mtime,
            force: params.force,
        }
    }

    pub fn message(&self, block: Block) -> FileBcastMessage {
        FileBcastMessage {
            header: FileBcastHeader {
                fname: self.fname.clone(),
                block_no: block.block_no,
                last_block: block.last_block,
                force: self.force,
                compress: block.compress,
                modes: self.modes,
                uid: self.uid,
                user_name: self.user_name.clone(),
                gid: self.gid,
                atime: self.atime,
                mtime: self.mtime,
                block_len: block.payload.len() as u32,
                uncomp_len: block.uncompressed_len as u32,
                cred: self.cred.clone(),
            },
            block: block.payload,
        }
    }

    pub fn destination(&self) -> &str {
        &self.fname
    }
}
