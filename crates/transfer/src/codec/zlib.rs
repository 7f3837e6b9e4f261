use filebcast_protocol::CompressionMode;
use filebcast_protocol::constants::{ZLIB_CHUNK_SIZE, ZLIB_OUTPUT_SLACK};
use flate2::{Compress, Compression, FlushCompress, Status};

use super::{BlockCodec, Cursor};
use crate::TransferError;
use crate::types::EncodedBlock;

/// Deflates every block into its own self-contained zlib stream, so a
/// receiver can inflate any block without the ones before it.
pub struct ZlibCodec<'a> {
    cursor: Cursor<'a>,
    out_capacity: usize,
}

impl<'a> ZlibCodec<'a> {
    pub fn new(data: &'a [u8], block_size: usize) -> Self {
        let cursor = Cursor::new(data, block_size);
        let out_capacity = output_capacity(cursor.block_size());
        Self {
            cursor,
            out_capacity,
        }
    }

    fn deflate(&self, input: &[u8]) -> Result<Vec<u8>, TransferError> {
        let fail = |message: String| TransferError::compression(CompressionMode::Zlib, message);

        let mut stream = Compress::new(Compression::default(), true);
        let mut out = Vec::with_capacity(self.out_capacity);
        let mut chunks = input.chunks(ZLIB_CHUNK_SIZE).peekable();

        while let Some(chunk) = chunks.next() {
            let finish = chunks.peek().is_none();
            let flush = if finish {
                FlushCompress::Finish
            } else {
                FlushCompress::None
            };

            let before = stream.total_in();
            let status = stream
                .compress_vec(chunk, &mut out, flush)
                .map_err(|e| fail(e.to_string()))?;

            if (stream.total_in() - before) as usize != chunk.len() {
                return Err(fail(format!(
                    "output buffer of {} bytes exhausted",
                    self.out_capacity
                )));
            }
            if finish && status != Status::StreamEnd {
                return Err(fail(format!("stream not finished ({status:?})")));
            }
        }
        Ok(out)
    }
}

/// Block size plus fixed slack, raised to zlib's own worst-case bound for
/// blocks large enough that the slack no longer covers stored-block overhead.
fn output_capacity(block_size: usize) -> usize {
    let bound = block_size + (block_size >> 12) + (block_size >> 14) + (block_size >> 25) + 13;
    (block_size + ZLIB_OUTPUT_SLACK).max(bound)
}

impl BlockCodec for ZlibCodec<'_> {
    fn mode(&self) -> CompressionMode {
        CompressionMode::Zlib
    }

    fn next_block(&mut self) -> Result<Option<EncodedBlock>, TransferError> {
        let Some(input) = self.cursor.take() else {
            return Ok(None);
        };
        let payload = if input.is_empty() {
            Vec::new()
        } else {
            self.deflate(input)?
        };
        Ok(Some(EncodedBlock {
            payload,
            uncompressed_len: input.len(),
            more: self.cursor.has_more(),
        }))
    }
}
