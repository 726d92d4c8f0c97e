/// SquashFS superblock parsing
///
/// The superblock is the fixed 96-byte header at offset 0. Its magic decides
/// the byte order used for every later structure in the image.
use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use super::cursor::{Endianness, StreamCursor};
use crate::error::{Result, SquashError};
use crate::fs::common::ByteSource;

// ============================================================================
// Constants
// ============================================================================

/// "hsqs" read as a little-endian u32
pub const SQUASHFS_MAGIC: u32 = 0x7371_7368;

pub const SUPERBLOCK_SIZE: usize = 96;

/// Only the 4.x on-disk layout is decoded
pub const SUPPORTED_VERSION_MAJOR: u16 = 4;

/// Table offset written when a table is absent
pub const TABLE_NOT_PRESENT: u64 = u64::MAX;

// ============================================================================
// Structures
// ============================================================================

/// Compression algorithm ids as stored in the superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Compression {
    Gzip,
    Lzma,
    Lzo,
    Xz,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Lzma),
            3 => Some(Compression::Lzo),
            4 => Some(Compression::Xz),
            5 => Some(Compression::Lz4),
            6 => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn id(self) -> u16 {
        match self {
            Compression::Gzip => 1,
            Compression::Lzma => 2,
            Compression::Lzo => 3,
            Compression::Xz => 4,
            Compression::Lz4 => 5,
            Compression::Zstd => 6,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::Gzip => write!(f, "gzip"),
            Compression::Lzma => write!(f, "lzma"),
            Compression::Lzo => write!(f, "lzo"),
            Compression::Xz => write!(f, "xz"),
            Compression::Lz4 => write!(f, "lz4"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

bitflags! {
    /// Superblock feature flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct SuperblockFlags: u16 {
        const INODES_UNCOMPRESSED = 0x0001;
        const DATA_UNCOMPRESSED = 0x0002;
        const CHECK = 0x0004;
        const FRAGMENTS_UNCOMPRESSED = 0x0008;
        const NO_FRAGMENTS = 0x0010;
        const ALWAYS_FRAGMENTS = 0x0020;
        const DUPLICATES = 0x0040;
        const EXPORTABLE = 0x0080;
        const XATTRS_UNCOMPRESSED = 0x0100;
        const NO_XATTRS = 0x0200;
        const COMPRESSOR_OPTIONS = 0x0400;
        const IDS_UNCOMPRESSED = 0x0800;
    }
}

/// Reference to an inode: metadata block position relative to the inode
/// table start, plus the offset inside that block's uncompressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InodeRef {
    pub block: u64,
    pub offset: u16,
}

impl InodeRef {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            block: (raw >> 16) & 0xFFFF_FFFF,
            offset: (raw & 0xFFFF) as u16,
        }
    }
}

/// Decoding parameters fixed by the superblock and passed to every later
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub endianness: Endianness,
    pub block_size: u32,
    pub compression: Compression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Superblock {
    pub endianness: Endianness,
    pub inode_count: u32,
    pub modification_time: u32,
    pub block_size: u32,
    pub fragment_count: u32,
    pub compression: Compression,
    pub block_log: u16,
    pub flags: SuperblockFlags,
    pub id_count: u16,
    pub version_major: u16,
    pub version_minor: u16,
    pub root_inode: InodeRef,
    pub bytes_used: u64,
    pub id_table_start: u64,
    pub xattr_id_table_start: u64,
    pub inode_table_start: u64,
    pub directory_table_start: u64,
    pub fragment_table_start: u64,
    pub export_table_start: u64,
}

impl Superblock {
    /// Read and parse the superblock at offset 0 of `source`
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self> {
        source.seek(0)?;
        let data = source.read_exactly(SUPERBLOCK_SIZE)?;
        Self::parse(&data)
    }

    /// Parse a superblock from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SUPERBLOCK_SIZE {
            return Err(SquashError::truncated("superblock", 0, SUPERBLOCK_SIZE));
        }

        let endianness = detect_endianness(data)?;
        let mut cursor = StreamCursor::new(&data[4..SUPERBLOCK_SIZE], endianness, "superblock");

        let inode_count = cursor.u32()?;
        let modification_time = cursor.u32()?;
        let block_size = cursor.u32()?;
        let fragment_count = cursor.u32()?;
        let compression_id = cursor.u16()?;
        let block_log = cursor.u16()?;
        let flags = SuperblockFlags::from_bits_retain(cursor.u16()?);
        let id_count = cursor.u16()?;
        let version_major = cursor.u16()?;
        let version_minor = cursor.u16()?;
        let root_inode = InodeRef::from_raw(cursor.u64()?);
        let bytes_used = cursor.u64()?;
        let id_table_start = cursor.u64()?;
        let xattr_id_table_start = cursor.u64()?;
        let inode_table_start = cursor.u64()?;
        let directory_table_start = cursor.u64()?;
        let fragment_table_start = cursor.u64()?;
        let export_table_start = cursor.u64()?;

        if version_major != SUPPORTED_VERSION_MAJOR {
            return Err(SquashError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let compression = Compression::from_id(compression_id).ok_or(
            SquashError::UnsupportedCompression { id: compression_id },
        )?;

        if !block_size.is_power_of_two() {
            return Err(SquashError::InvalidBlockSize { block_size });
        }
        if u32::from(block_log) != block_size.trailing_zeros() {
            tracing::warn!(
                "Superblock block_log {} disagrees with block size {}",
                block_log,
                block_size
            );
        }

        tracing::debug!(
            "Parsed {} superblock: {} inodes, block size {}, {} compression",
            endianness,
            inode_count,
            block_size,
            compression
        );

        Ok(Superblock {
            endianness,
            inode_count,
            modification_time,
            block_size,
            fragment_count,
            compression,
            block_log,
            flags,
            id_count,
            version_major,
            version_minor,
            root_inode,
            bytes_used,
            id_table_start,
            xattr_id_table_start,
            inode_table_start,
            directory_table_start,
            fragment_table_start,
            export_table_start,
        })
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.modification_time), 0)
            .single()
    }

    pub fn params(&self) -> ImageParams {
        ImageParams {
            endianness: self.endianness,
            block_size: self.block_size,
            compression: self.compression,
        }
    }

    /// Byte range `[start, end)` of the inode table region
    pub fn inode_table_range(&self) -> (u64, u64) {
        (self.inode_table_start, self.directory_table_start)
    }

    /// Byte range `[start, end)` of the directory table region.
    ///
    /// The region ends where the fragment table starts. Without a fragment
    /// table it ends at the first metadata block of the nearest following
    /// indexed table (export, id or xattr-id). Those superblock offsets point
    /// at the table index, so the block address is the index's first entry.
    /// With no following table the region runs to `bytes_used`.
    pub fn directory_table_range<S: ByteSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<(u64, u64)> {
        let start = self.directory_table_start;
        if self.fragment_table_start != TABLE_NOT_PRESENT {
            return Ok((start, self.fragment_table_start));
        }

        let index_start = [
            self.export_table_start,
            self.id_table_start,
            self.xattr_id_table_start,
        ]
        .into_iter()
        .filter(|&offset| offset != TABLE_NOT_PRESENT && offset > start)
        .min();

        let Some(index_start) = index_start else {
            return Ok((start, self.bytes_used));
        };

        source.seek(index_start)?;
        let end = self.endianness.read_u64(&source.read_exactly(8)?);
        if end < start || end > index_start {
            return Err(SquashError::CorruptBlock {
                offset: index_start,
                reason: format!(
                    "table index entry 0x{:x} outside directory table bound [0x{:x}, 0x{:x}]",
                    end, start, index_start
                ),
            });
        }

        tracing::debug!(
            "No fragment table, directory table ends at 0x{:x} (index at 0x{:x})",
            end,
            index_start
        );
        Ok((start, end))
    }
}

/// Determine byte order from the magic: little-endian first, then big-endian
fn detect_endianness(data: &[u8]) -> Result<Endianness> {
    let magic = &data[0..4];
    if Endianness::Little.read_u32(magic) == SQUASHFS_MAGIC {
        Ok(Endianness::Little)
    } else if Endianness::Big.read_u32(magic) == SQUASHFS_MAGIC {
        Ok(Endianness::Big)
    } else {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        Err(SquashError::InvalidMagic { found })
    }
}

/// Check if data starts with a SquashFS superblock signature
pub fn is_squashfs_superblock(data: &[u8]) -> bool {
    data.len() >= 4 && detect_endianness(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fields {
        compression: u16,
        version_major: u16,
        block_size: u32,
    }

    impl Default for Fields {
        fn default() -> Self {
            Self {
                compression: 1,
                version_major: 4,
                block_size: 131072,
            }
        }
    }

    fn encode(fields: &Fields, big_endian: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(SUPERBLOCK_SIZE);
        let mut put = |bytes: &[u8]| {
            if big_endian {
                out.extend(bytes.iter().rev());
            } else {
                out.extend_from_slice(bytes);
            }
        };
        put(&SQUASHFS_MAGIC.to_le_bytes());
        put(&7u32.to_le_bytes());
        put(&1_700_000_000u32.to_le_bytes());
        put(&fields.block_size.to_le_bytes());
        put(&2u32.to_le_bytes());
        put(&fields.compression.to_le_bytes());
        put(&17u16.to_le_bytes());
        put(&0x00C0u16.to_le_bytes());
        put(&1u16.to_le_bytes());
        put(&fields.version_major.to_le_bytes());
        put(&0u16.to_le_bytes());
        put(&((0x20u64 << 16) | 0x40).to_le_bytes());
        put(&4096u64.to_le_bytes());
        put(&4000u64.to_le_bytes());
        put(&TABLE_NOT_PRESENT.to_le_bytes());
        put(&96u64.to_le_bytes());
        put(&500u64.to_le_bytes());
        put(&900u64.to_le_bytes());
        put(&TABLE_NOT_PRESENT.to_le_bytes());
        out
    }

    #[test]
    fn test_parse_little_endian() {
        let sb = Superblock::parse(&encode(&Fields::default(), false)).unwrap();
        assert_eq!(sb.endianness, Endianness::Little);
        assert_eq!(sb.inode_count, 7);
        assert_eq!(sb.block_size, 131072);
        assert_eq!(sb.block_log, 17);
        assert_eq!(sb.compression, Compression::Gzip);
        assert!(sb.flags.contains(SuperblockFlags::DUPLICATES));
        assert!(sb.flags.contains(SuperblockFlags::EXPORTABLE));
        assert_eq!(sb.root_inode, InodeRef { block: 0x20, offset: 0x40 });
        assert_eq!(sb.inode_table_range(), (96, 500));
    }

    #[test]
    fn test_byte_order_does_not_change_fields() {
        let le = Superblock::parse(&encode(&Fields::default(), false)).unwrap();
        let be = Superblock::parse(&encode(&Fields::default(), true)).unwrap();
        assert_eq!(be.endianness, Endianness::Big);
        assert_eq!(Superblock { endianness: Endianness::Little, ..be }, le);
    }

    #[test]
    fn test_corrupted_magic() {
        let mut data = encode(&Fields::default(), false);
        data[0..4].copy_from_slice(b"sqsX");
        match Superblock::parse(&data) {
            Err(SquashError::InvalidMagic { found }) => assert_eq!(&found, b"sqsX"),
            other => panic!("expected InvalidMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version_keeps_numbers() {
        let fields = Fields {
            version_major: 3,
            ..Fields::default()
        };
        match Superblock::parse(&encode(&fields, false)) {
            Err(SquashError::UnsupportedVersion { major, minor }) => {
                assert_eq!(major, 3);
                assert_eq!(minor, 0);
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_compression_id() {
        let fields = Fields {
            compression: 9,
            ..Fields::default()
        };
        assert!(matches!(
            Superblock::parse(&encode(&fields, false)),
            Err(SquashError::UnsupportedCompression { id: 9 })
        ));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let fields = Fields {
            block_size: 0,
            ..Fields::default()
        };
        assert!(matches!(
            Superblock::parse(&encode(&fields, false)),
            Err(SquashError::InvalidBlockSize { block_size: 0 })
        ));
    }

    #[test]
    fn test_short_input() {
        assert!(matches!(
            Superblock::parse(&[0x68, 0x73, 0x71, 0x73]),
            Err(SquashError::TruncatedInput { .. })
        ));
    }

    fn index_image(entries: &[(u64, u64)], len: usize) -> std::io::Cursor<Vec<u8>> {
        let mut image = vec![0u8; len];
        for &(at, pointer) in entries {
            let at = at as usize;
            image[at..at + 8].copy_from_slice(&pointer.to_le_bytes());
        }
        std::io::Cursor::new(image)
    }

    #[test]
    fn test_directory_range_with_fragment_table() {
        let sb = Superblock::parse(&encode(&Fields::default(), false)).unwrap();
        let mut source = index_image(&[], 0);
        assert_eq!(sb.directory_table_range(&mut source).unwrap(), (500, 900));
    }

    #[test]
    fn test_directory_range_without_fragment_table() {
        let mut sb = Superblock::parse(&encode(&Fields::default(), false)).unwrap();
        sb.fragment_table_start = TABLE_NOT_PRESENT;
        // Id index at 4000 names its first metadata block at 3980
        let mut source = index_image(&[(4000, 3980)], 4096);
        assert_eq!(sb.directory_table_range(&mut source).unwrap(), (500, 3980));

        sb.id_table_start = TABLE_NOT_PRESENT;
        assert_eq!(sb.directory_table_range(&mut source).unwrap(), (500, 4096));
    }

    #[test]
    fn test_directory_range_rejects_bad_index_entry() {
        let mut sb = Superblock::parse(&encode(&Fields::default(), false)).unwrap();
        sb.fragment_table_start = TABLE_NOT_PRESENT;
        let mut source = index_image(&[(4000, 100)], 4096);
        assert!(matches!(
            sb.directory_table_range(&mut source),
            Err(SquashError::CorruptBlock { offset: 4000, .. })
        ));

        let mut short = index_image(&[], 4002);
        assert!(matches!(
            sb.directory_table_range(&mut short),
            Err(SquashError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_magic_detection() {
        assert!(is_squashfs_superblock(b"hsqs"));
        assert!(is_squashfs_superblock(b"sqsh"));
        assert!(!is_squashfs_superblock(b"XFSB"));
        assert!(!is_squashfs_superblock(b"hs"));
    }
}
