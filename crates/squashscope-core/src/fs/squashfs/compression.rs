/// Metadata block decompression
///
/// The decoder only knows compression by its superblock id. Implementations
/// are registered per algorithm; zlib ("gzip" in SquashFS terms) ships by
/// default.
use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;

use super::superblock::Compression;
use crate::error::{Result, SquashError};

pub trait Decompressor: Send + Sync {
    /// Inflate `input`, producing at most `limit` bytes
    fn decompress(&self, input: &[u8], limit: usize) -> Result<Vec<u8>>;
}

/// zlib stream decompression via flate2
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(&self, input: &[u8], limit: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(limit);
        // Read one byte past the limit so oversized payloads are detectable
        ZlibDecoder::new(input)
            .take(limit as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| SquashError::CorruptBlock {
                offset: 0,
                reason: format!("zlib: {}", e),
            })?;

        if out.len() > limit {
            return Err(SquashError::CorruptBlock {
                offset: 0,
                reason: format!("inflated payload exceeds {} bytes", limit),
            });
        }
        Ok(out)
    }
}

/// Decompressors available to the metadata reader, keyed by algorithm
pub struct CompressionRegistry {
    decompressors: HashMap<Compression, Box<dyn Decompressor>>,
}

impl CompressionRegistry {
    /// A registry with no decompressors; only stored blocks can be read
    pub fn empty() -> Self {
        Self {
            decompressors: HashMap::new(),
        }
    }

    pub fn register(&mut self, algorithm: Compression, decompressor: Box<dyn Decompressor>) {
        self.decompressors.insert(algorithm, decompressor);
    }

    pub fn supports(&self, algorithm: Compression) -> bool {
        self.decompressors.contains_key(&algorithm)
    }

    pub fn decompress(&self, algorithm: Compression, input: &[u8], limit: usize) -> Result<Vec<u8>> {
        let decompressor = self
            .decompressors
            .get(&algorithm)
            .ok_or(SquashError::UnsupportedCompression { id: algorithm.id() })?;
        decompressor.decompress(input, limit)
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Compression::Gzip, Box::new(ZlibDecompressor));
        registry
    }
}

impl std::fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.decompressors.keys()).finish()
    }
}
