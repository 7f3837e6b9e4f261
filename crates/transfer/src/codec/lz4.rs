use filebcast_protocol::CompressionMode;
use lz4_flex::block::{compress_into, get_maximum_output_size};

use super::{BlockCodec, Cursor};
use crate::TransferError;
use crate::types::EncodedBlock;

/// LZ4 block format, one independent block per wire block.
pub struct Lz4Codec<'a> {
    cursor: Cursor<'a>,
    bound: usize,
}

impl<'a> Lz4Codec<'a> {
    pub fn new(data: &'a [u8], block_size: usize) -> Self {
        let cursor = Cursor::new(data, block_size);
        let bound = get_maximum_output_size(cursor.block_size());
        Self { cursor, bound }
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, TransferError> {
        let mut out = vec![0u8; self.bound];
        let written = compress_into(input, &mut out)
            .map_err(|e| TransferError::compression(CompressionMode::Lz4, e.to_string()))?;
        if written == 0 {
            return Err(TransferError::compression(
                CompressionMode::Lz4,
                format!("no output for {} input bytes", input.len()),
            ));
        }
        out.truncate(written);
        Ok(out)
    }
}

impl BlockCodec for Lz4Codec<'_> {
    fn mode(&self) -> CompressionMode {
        CompressionMode::Lz4
    }

    fn next_block(&mut self) -> Result<Option<EncodedBlock>, TransferError> {
        let Some(input) = self.cursor.take() else {
            return Ok(None);
        };
        let payload = if input.is_empty() {
            Vec::new()
        } else {
            self.compress(input)?
        };
        Ok(Some(EncodedBlock {
            payload,
            uncompressed_len: input.len(),
            more: self.cursor.has_more(),
        }))
    }
}
