/// Metadata region reassembly
///
/// SquashFS stores its inode, directory and id tables as a chain of
/// metadata blocks. Each block starts with a 16-bit header:
/// - bit 15 set: payload stored uncompressed
/// - bits 0-14: on-disk payload length
///
/// Walking the chain and concatenating the payloads yields the logical
/// stream the table decoders index into. Logical offsets differ from image
/// offsets, so the block map is kept for reference resolution.
use rayon::prelude::*;
use serde::Serialize;

use super::compression::CompressionRegistry;
use super::superblock::ImageParams;
use crate::error::{Result, SquashError};
use crate::fs::common::ByteSource;

/// Uncompressed capacity of one metadata block
pub const METADATA_BLOCK_SIZE: usize = 8192;

const STORED_FLAG: u16 = 0x8000;
const LENGTH_MASK: u16 = 0x7FFF;
const HEADER_SIZE: u64 = 2;

/// Settings for region reads
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Inflate compressed blocks on the rayon pool
    pub parallel_decompression: bool,
    /// Minimum number of compressed blocks before going parallel
    pub parallel_threshold: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            parallel_decompression: true,
            parallel_threshold: 4,
        }
    }
}

/// Where one metadata block sits on disk and in the logical stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSpan {
    /// Offset of the block header, relative to the region start
    pub disk_offset: u64,
    /// Offset of the block payload in the logical stream
    pub logical_offset: usize,
}

/// Decompressed contents of a metadata region
#[derive(Debug, Clone, Default)]
pub struct MetadataStream {
    pub data: Vec<u8>,
    pub blocks: Vec<BlockSpan>,
}

impl MetadataStream {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Map a (block offset relative to region start, offset within block)
    /// reference to a logical stream position
    pub fn resolve(&self, block: u64, offset: u16) -> Option<usize> {
        resolve_span(&self.blocks, block, offset).filter(|&position| position <= self.data.len())
    }
}

/// Block-map lookup shared by streams and decoded results
pub fn resolve_span(blocks: &[BlockSpan], block: u64, offset: u16) -> Option<usize> {
    let index = blocks
        .binary_search_by_key(&block, |span| span.disk_offset)
        .ok()?;
    Some(blocks[index].logical_offset + usize::from(offset))
}

/// A framed block as found on disk
struct RawBlock {
    offset: u64,
    stored: bool,
    payload: Vec<u8>,
}

/// Split a block header into (stored uncompressed, payload length)
fn decode_header(header: u16) -> (bool, usize) {
    (header & STORED_FLAG != 0, (header & LENGTH_MASK) as usize)
}

fn read_raw_block<S: ByteSource + ?Sized>(
    source: &mut S,
    offset: u64,
    params: &ImageParams,
) -> Result<RawBlock> {
    source.seek(offset)?;
    let header = source.read_exactly(HEADER_SIZE as usize)?;
    let (stored, length) = decode_header(params.endianness.read_u16(&header));
    let payload = source.read_exactly(length)?;
    Ok(RawBlock {
        offset,
        stored,
        payload,
    })
}

fn inflate(block: RawBlock, params: &ImageParams, registry: &CompressionRegistry) -> Result<Vec<u8>> {
    if block.stored {
        if block.payload.len() > METADATA_BLOCK_SIZE {
            return Err(SquashError::CorruptBlock {
                offset: block.offset,
                reason: format!("stored payload of {} bytes", block.payload.len()),
            });
        }
        return Ok(block.payload);
    }

    registry
        .decompress(params.compression, &block.payload, METADATA_BLOCK_SIZE)
        .map_err(|e| match e {
            SquashError::CorruptBlock { reason, .. } => SquashError::CorruptBlock {
                offset: block.offset,
                reason,
            },
            other => other,
        })
}

/// Read one framed metadata block at `offset`, returning its payload and
/// the on-disk size consumed (header included)
pub fn read_metadata_block<S: ByteSource + ?Sized>(
    source: &mut S,
    offset: u64,
    params: &ImageParams,
    registry: &CompressionRegistry,
) -> Result<(Vec<u8>, u64)> {
    let block = read_raw_block(source, offset, params)?;
    let consumed = HEADER_SIZE + block.payload.len() as u64;
    Ok((inflate(block, params, registry)?, consumed))
}

/// Reassemble the logical stream for the region `[start, end)`
pub fn read_metadata_region<S: ByteSource + ?Sized>(
    source: &mut S,
    start: u64,
    end: u64,
    params: &ImageParams,
    registry: &CompressionRegistry,
    config: &ReaderConfig,
) -> Result<MetadataStream> {
    // Header positions depend on every earlier block length, so the scan is
    // sequential. Only inflation may run in parallel.
    let mut raw_blocks = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let block = read_raw_block(source, cursor, params)?;
        tracing::debug!(
            "Metadata block at {}: {} bytes, {}",
            cursor,
            block.payload.len(),
            if block.stored { "stored" } else { "compressed" }
        );
        cursor += HEADER_SIZE + block.payload.len() as u64;
        raw_blocks.push(block);
    }

    let compressed_count = raw_blocks.iter().filter(|b| !b.stored).count();
    if compressed_count > 0 && !registry.supports(params.compression) {
        return Err(SquashError::UnsupportedCompression {
            id: params.compression.id(),
        });
    }

    let disk_offsets: Vec<u64> = raw_blocks.iter().map(|b| b.offset - start).collect();

    let payloads: Vec<Vec<u8>> =
        if config.parallel_decompression && compressed_count >= config.parallel_threshold {
            raw_blocks
                .into_par_iter()
                .map(|block| inflate(block, params, registry))
                .collect::<Result<_>>()?
        } else {
            raw_blocks
                .into_iter()
                .map(|block| inflate(block, params, registry))
                .collect::<Result<_>>()?
        };

    let mut stream = MetadataStream {
        data: Vec::with_capacity(payloads.iter().map(Vec::len).sum()),
        blocks: Vec::with_capacity(payloads.len()),
    };
    for (disk_offset, payload) in disk_offsets.into_iter().zip(payloads) {
        stream.blocks.push(BlockSpan {
            disk_offset,
            logical_offset: stream.data.len(),
        });
        stream.data.extend_from_slice(&payload);
    }

    tracing::debug!(
        "Region [{}, {}): {} blocks, {} logical bytes",
        start,
        end,
        stream.blocks.len(),
        stream.data.len()
    );

    Ok(stream)
}
