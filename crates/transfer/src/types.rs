use filebcast_protocol::CompressionMode;

/// One codec step: the payload for the next block and whether any source
/// bytes remain after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Encoded bytes, exactly what goes on the wire.
    pub payload: Vec<u8>,
    /// Source bytes consumed to produce `payload`.
    pub uncompressed_len: usize,
    /// `true` while the source has bytes left after this block.
    pub more: bool,
}

/// A numbered block, ready to be wrapped into a wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// 1-based, increases by exactly one per block.
    pub block_no: u32,
    pub payload: Vec<u8>,
    pub uncompressed_len: usize,
    pub compress: CompressionMode,
    pub last_block: bool,
}

impl Block {
    /// Stamps a block number on a codec step.
    ///
    /// The last-block flag follows from the codec running out of input.
    pub fn from_encoded(block_no: u32, encoded: EncodedBlock, compress: CompressionMode) -> Self {
        Self {
            block_no,
            last_block: !encoded.more,
            payload: encoded.payload,
            uncompressed_len: encoded.uncompressed_len,
            compress,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
