//! Per-block codecs.
//!
//! A codec owns a forward-only cursor over the mapped source file and
//! hands out one encoded block per call until the file is exhausted.
//! Codecs are created once per broadcast and never rewound.

mod none;
#[cfg(feature = "lz4")]
mod lz4;
#[cfg(feature = "zlib")]
mod zlib;

use filebcast_protocol::CompressionMode;
use tracing::warn;

use crate::TransferError;
use crate::types::EncodedBlock;

pub use none::NoneCodec;
#[cfg(feature = "lz4")]
pub use lz4::Lz4Codec;
#[cfg(feature = "zlib")]
pub use zlib::ZlibCodec;

/// Produces the blocks of one broadcast, in order.
pub trait BlockCodec: Send {
    /// Compression tag carried by every block this codec produces.
    fn mode(&self) -> CompressionMode;

    /// Encodes the next block.
    ///
    /// An empty source yields exactly one empty block. Returns `None` once
    /// the block with `more == false` has been handed out.
    fn next_block(&mut self) -> Result<Option<EncodedBlock>, TransferError>;
}

/// Which compressed codecs may be used in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub zlib: bool,
    pub lz4: bool,
}

impl Capabilities {
    /// Codecs built into this binary (cargo features `zlib` and `lz4`).
    pub fn compiled() -> Self {
        Self {
            zlib: cfg!(feature = "zlib"),
            lz4: cfg!(feature = "lz4"),
        }
    }

    /// Uncompressed transfer only.
    pub fn none() -> Self {
        Self {
            zlib: false,
            lz4: false,
        }
    }

    pub fn supports(&self, mode: CompressionMode) -> bool {
        match mode {
            CompressionMode::None => true,
            CompressionMode::Zlib => self.zlib,
            CompressionMode::Lz4 => self.lz4,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::compiled()
    }
}

/// Records that a requested codec could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDowngrade {
    pub requested: CompressionMode,
    pub reason: String,
}

/// Result of [`select_codec`]: the codec to drive, plus the downgrade that
/// led to it, if any.
pub struct CodecSelection<'a> {
    pub codec: Box<dyn BlockCodec + 'a>,
    pub downgrade: Option<CodecDowngrade>,
}

impl CodecSelection<'_> {
    /// Compression actually applied to the blocks.
    pub fn mode(&self) -> CompressionMode {
        self.codec.mode()
    }
}

/// Builds the codec for `requested`, falling back to uncompressed blocks
/// when that codec is unavailable or cannot be set up.
pub fn select_codec<'a>(
    requested: CompressionMode,
    data: &'a [u8],
    block_size: usize,
    caps: &Capabilities,
) -> CodecSelection<'a> {
    let built = if caps.supports(requested) {
        build(requested, data, block_size)
    } else {
        Err(format!("{requested} compression not supported"))
    };

    match built {
        Ok(codec) => CodecSelection {
            codec,
            downgrade: None,
        },
        Err(reason) => {
            warn!(requested = %requested, %reason, "sending uncompressed file");
            CodecSelection {
                codec: Box::new(NoneCodec::new(data, block_size)),
                downgrade: Some(CodecDowngrade { requested, reason }),
            }
        }
    }
}

fn build<'a>(
    mode: CompressionMode,
    data: &'a [u8],
    block_size: usize,
) -> Result<Box<dyn BlockCodec + 'a>, String> {
    match mode {
        CompressionMode::None => Ok(Box::new(NoneCodec::new(data, block_size))),
        #[cfg(feature = "zlib")]
        CompressionMode::Zlib => Ok(Box::new(ZlibCodec::new(data, block_size))),
        #[cfg(feature = "lz4")]
        CompressionMode::Lz4 => Ok(Box::new(Lz4Codec::new(data, block_size))),
        #[allow(unreachable_patterns)]
        other => Err(format!("{other} compression not compiled in")),
    }
}

/// Forward-only position in the source bytes.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    block_size: usize,
    done: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8], block_size: usize) -> Self {
        Self {
            data,
            pos: 0,
            block_size: block_size.max(1),
            done: false,
        }
    }

    /// Next `min(block_size, remaining)` bytes; an empty slice once for an
    /// empty source; `None` when finished.
    pub(crate) fn take(&mut self) -> Option<&'a [u8]> {
        if self.done {
            return None;
        }
        let n = self.block_size.min(self.data.len() - self.pos);
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        if self.pos == self.data.len() {
            self.done = true;
        }
        Some(slice)
    }

    pub(crate) fn has_more(&self) -> bool {
        !self.done
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut dyn BlockCodec) -> Vec<EncodedBlock> {
        let mut blocks = Vec::new();
        while let Some(block) = codec.next_block().unwrap() {
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn cursor_walks_blocks() {
        let data = b"AABBCCDDEE";
        let mut cursor = Cursor::new(data, 4);
        assert_eq!(cursor.take(), Some(&b"AABB"[..]));
        assert!(cursor.has_more());
        assert_eq!(cursor.take(), Some(&b"CCDD"[..]));
        assert_eq!(cursor.take(), Some(&b"EE"[..]));
        assert!(!cursor.has_more());
        assert_eq!(cursor.take(), None);
    }

    #[test]
    fn cursor_empty_source_yields_one_empty_slice() {
        let mut cursor = Cursor::new(&[], 0);
        assert_eq!(cursor.take(), Some(&[][..]));
        assert_eq!(cursor.take(), None);
    }

    #[test]
    fn none_always_available() {
        assert!(Capabilities::none().supports(CompressionMode::None));
        assert!(!Capabilities::none().supports(CompressionMode::Zlib));
        assert!(!Capabilities::none().supports(CompressionMode::Lz4));
    }

    #[test]
    fn unsupported_codec_downgrades_to_none() {
        let data = vec![7u8; 100];
        let sel = select_codec(CompressionMode::Lz4, &data, 40, &Capabilities::none());
        assert_eq!(sel.mode(), CompressionMode::None);
        let downgrade = sel.downgrade.clone().unwrap();
        assert_eq!(downgrade.requested, CompressionMode::Lz4);
        assert!(downgrade.reason.contains("lz4"));
    }

    #[test]
    fn downgraded_output_matches_explicit_none() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let mut downgraded = select_codec(CompressionMode::Zlib, &data, 300, &Capabilities::none());
        let mut explicit = select_codec(CompressionMode::None, &data, 300, &Capabilities::none());
        assert!(explicit.downgrade.is_none());

        assert_eq!(
            drain(downgraded.codec.as_mut()),
            drain(explicit.codec.as_mut())
        );
    }

    #[cfg(feature = "zlib")]
    #[test]
    fn supported_codec_is_selected() {
        let data = vec![0u8; 10];
        let sel = select_codec(CompressionMode::Zlib, &data, 10, &Capabilities::compiled());
        assert_eq!(sel.mode(), CompressionMode::Zlib);
        assert!(sel.downgrade.is_none());
    }
}
