/// SquashFS id table
///
/// Inodes store uid/gid as 16-bit indexes into this table. On disk the
/// table start points at a list of 64-bit pointers, one per metadata block
/// holding packed 32-bit ids.
use serde::Serialize;

use super::compression::CompressionRegistry;
use super::cursor::StreamCursor;
use super::metadata::{read_metadata_block, METADATA_BLOCK_SIZE};
use super::superblock::Superblock;
use crate::error::Result;
use crate::fs::common::ByteSource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdTable {
    pub ids: Vec<u32>,
}

impl IdTable {
    pub fn read<S: ByteSource + ?Sized>(
        source: &mut S,
        superblock: &Superblock,
        registry: &CompressionRegistry,
    ) -> Result<Self> {
        let params = superblock.params();
        let id_count = usize::from(superblock.id_count);
        let byte_len = id_count * 4;
        let block_count = byte_len.div_ceil(METADATA_BLOCK_SIZE);

        source.seek(superblock.id_table_start)?;
        let pointer_bytes = source.read_exactly(block_count * 8)?;
        let mut pointers = StreamCursor::new(&pointer_bytes, params.endianness, "id table pointers");

        let mut data = Vec::with_capacity(byte_len);
        for _ in 0..block_count {
            let block_start = pointers.u64()?;
            let (payload, _) = read_metadata_block(source, block_start, &params, registry)?;
            data.extend_from_slice(&payload);
        }

        let mut cursor = StreamCursor::new(&data, params.endianness, "id table");
        let ids = (0..id_count)
            .map(|_| cursor.u32())
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Read {} ids from {} blocks", ids.len(), block_count);
        Ok(IdTable { ids })
    }

    pub fn lookup(&self, index: u16) -> Option<u32> {
        self.ids.get(usize::from(index)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
