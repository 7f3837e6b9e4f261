use filebcast_protocol::CompressionMode;

use super::{BlockCodec, Cursor};
use crate::TransferError;
use crate::types::EncodedBlock;

/// Copies the source verbatim, one block at a time.
pub struct NoneCodec<'a> {
    cursor: Cursor<'a>,
}

impl<'a> NoneCodec<'a> {
    pub fn new(data: &'a [u8], block_size: usize) -> Self {
        Self {
            cursor: Cursor::new(data, block_size),
        }
    }
}

impl BlockCodec for NoneCodec<'_> {
    fn mode(&self) -> CompressionMode {
        CompressionMode::None
    }

    fn next_block(&mut self) -> Result<Option<EncodedBlock>, TransferError> {
        let Some(input) = self.cursor.take() else {
            return Ok(None);
        };
        Ok(Some(EncodedBlock {
            payload: input.to_vec(),
            uncompressed_len: input.len(),
            more: self.cursor.has_more(),
        }))
    }
}
