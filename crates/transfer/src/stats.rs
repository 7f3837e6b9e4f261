use std::time::Duration;

/// Running totals of one broadcast's compression work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    uncompressed: u64,
    compressed: u64,
    elapsed: Duration,
}

impl CompressionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one block: source bytes consumed, payload bytes produced and
    /// time spent producing them.
    pub fn record(&mut self, uncompressed: usize, compressed: usize, elapsed: Duration) {
        self.uncompressed += uncompressed as u64;
        self.compressed += compressed as u64;
        self.elapsed += elapsed;
    }

    pub fn uncompressed(&self) -> u64 {
        self.uncompressed
    }

    pub fn compressed(&self) -> u64 {
        self.compressed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Space saved in percent of the uncompressed size.
    ///
    /// Negative when compression expanded the data. Truncates toward zero.
    /// `None` before any byte was processed.
    pub fn percent_saved(&self) -> Option<i64> {
        if self.uncompressed == 0 {
            return None;
        }
        let saved = self.uncompressed as i128 - self.compressed as i128;
        Some((saved * 100 / self.uncompressed as i128) as i64)
    }
}
