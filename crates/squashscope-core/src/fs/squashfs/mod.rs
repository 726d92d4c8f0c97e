/// SquashFS 4.x metadata support
use anyhow::Result;

pub mod compression;
pub mod cursor;
pub mod directory;
pub mod id_table;
pub mod inode;
pub mod metadata;
pub mod reader;
pub mod superblock;

pub use compression::{CompressionRegistry, Decompressor, ZlibDecompressor};
pub use cursor::Endianness;
pub use directory::DirectoryEntry;
pub use id_table::IdTable;
pub use inode::{Inode, InodeHeader, InodeKind, InodeType};
pub use metadata::{MetadataStream, ReaderConfig};
pub use reader::{ImageContents, SquashfsReader};
pub use superblock::{
    is_squashfs_superblock, Compression, ImageParams, InodeRef, Superblock, SuperblockFlags,
    SUPERBLOCK_SIZE,
};

use super::common::BlockDevice;

/// Get SquashFS image information
pub fn get_filesystem_info(device: &BlockDevice) -> Result<String> {
    let superblock = Superblock::parse(device.read_bytes(0, SUPERBLOCK_SIZE)?)?;

    let used_kb = superblock.bytes_used / 1024;
    let modified = superblock
        .modified_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| superblock.modification_time.to_string());

    Ok(format!(
        "SquashFS File System\n\
         - Version: {}.{}\n\
         - Byte Order: {}\n\
         - Compression: {}\n\
         - Block Size: {} bytes\n\
         - Inodes: {}\n\
         - Fragments: {}\n\
         - Ids: {}\n\
         - Bytes Used: {} KB\n\
         - Modified: {}\n\
         - Flags: 0x{:04x}\n\
         - Inode Table: 0x{:x}\n\
         - Directory Table: 0x{:x}",
        superblock.version_major,
        superblock.version_minor,
        superblock.endianness,
        superblock.compression,
        superblock.block_size,
        superblock.inode_count,
        superblock.fragment_count,
        superblock.id_count,
        used_kb,
        modified,
        superblock.flags.bits(),
        superblock.inode_table_start,
        superblock.directory_table_start
    ))
}
