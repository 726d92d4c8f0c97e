/// SquashFS inode table decoding
///
/// Inodes are packed back to back in the inode table's logical stream. A
/// record has no length prefix: its size follows from the type id and, for
/// files and symlinks, from fields decoded earlier in the same record.
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use super::cursor::StreamCursor;
use super::superblock::ImageParams;
use crate::error::{Result, SquashError};

// ============================================================================
// Constants
// ============================================================================

/// Size of the header shared by every inode type
pub const INODE_HEADER_SIZE: usize = 16;

/// Fragment index of a file whose tail is not packed into a fragment
pub const NO_FRAGMENT: u32 = 0xFFFF_FFFF;

// ============================================================================
// Structures
// ============================================================================

/// Inode type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InodeType {
    BasicDirectory = 1,
    BasicFile = 2,
    BasicSymlink = 3,
    BasicBlockDevice = 4,
    BasicCharDevice = 5,
    BasicFifo = 6,
    BasicSocket = 7,
    ExtendedDirectory = 8,
    ExtendedFile = 9,
    ExtendedSymlink = 10,
    ExtendedBlockDevice = 11,
    ExtendedCharDevice = 12,
    ExtendedFifo = 13,
    ExtendedSocket = 14,
}

impl InodeType {
    pub fn from_id(id: u16) -> Option<Self> {
        use InodeType::*;
        let kind = match id {
            1 => BasicDirectory,
            2 => BasicFile,
            3 => BasicSymlink,
            4 => BasicBlockDevice,
            5 => BasicCharDevice,
            6 => BasicFifo,
            7 => BasicSocket,
            8 => ExtendedDirectory,
            9 => ExtendedFile,
            10 => ExtendedSymlink,
            11 => ExtendedBlockDevice,
            12 => ExtendedCharDevice,
            13 => ExtendedFifo,
            14 => ExtendedSocket,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        use InodeType::*;
        match self {
            BasicDirectory => "directory",
            BasicFile => "file",
            BasicSymlink => "symlink",
            BasicBlockDevice => "block device",
            BasicCharDevice => "char device",
            BasicFifo => "fifo",
            BasicSocket => "socket",
            ExtendedDirectory => "extended directory",
            ExtendedFile => "extended file",
            ExtendedSymlink => "extended symlink",
            ExtendedBlockDevice => "extended block device",
            ExtendedCharDevice => "extended char device",
            ExtendedFifo => "extended fifo",
            ExtendedSocket => "extended socket",
        }
    }
}

/// Fields common to every inode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InodeHeader {
    pub type_id: u16,
    pub permissions: u16,
    /// Index into the id table
    pub uid_index: u16,
    /// Index into the id table
    pub gid_index: u16,
    pub modification_time: u32,
    pub inode_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InodeKind {
    Directory {
        /// Directory table block holding the listing, relative to the table start
        start_block: u32,
        link_count: u32,
        /// Listing size in bytes plus 3
        file_size: u16,
        /// Listing offset inside the uncompressed block
        offset: u16,
        /// Lookup-only back reference
        parent_inode: u32,
    },
    File {
        blocks_start: u32,
        fragment_index: u32,
        fragment_offset: u32,
        file_size: u32,
        /// On-disk size of each full data block
        block_sizes: Vec<u32>,
    },
    Symlink {
        link_count: u32,
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inode {
    pub header: InodeHeader,
    /// Offset of this record in the inode table's logical stream
    pub position: usize,
    pub kind: InodeKind,
}

impl Inode {
    pub fn inode_number(&self) -> u32 {
        self.header.inode_number
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, InodeKind::Directory { .. })
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.header.modification_time), 0)
            .single()
    }

    /// Short type label for listings
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            InodeKind::Directory { .. } => "dir",
            InodeKind::File { .. } => "file",
            InodeKind::Symlink { .. } => "symlink",
        }
    }

    /// Unix mode bits: file type from the variant plus stored permissions
    pub fn mode(&self) -> u32 {
        let file_type = match self.kind {
            InodeKind::Directory { .. } => 0o040000,
            InodeKind::File { .. } => 0o100000,
            InodeKind::Symlink { .. } => 0o120000,
        };
        file_type | u32::from(self.header.permissions & 0o7777)
    }

    /// Size in bytes: file length, symlink target length, or directory
    /// listing size
    pub fn size(&self) -> u64 {
        match &self.kind {
            InodeKind::Directory { file_size, .. } => u64::from(*file_size),
            InodeKind::File { file_size, .. } => u64::from(*file_size),
            InodeKind::Symlink { target, .. } => target.len() as u64,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Number of full data blocks a basic file stores sizes for.
///
/// The tail block lives in a fragment unless the fragment index is
/// `NO_FRAGMENT`, in which case it is a (possibly partial) data block.
pub fn block_count(file_size: u32, block_size: u32, fragment_index: u32) -> Result<u64> {
    if block_size == 0 {
        return Err(SquashError::InvalidBlockSize { block_size });
    }
    let file_size = u64::from(file_size);
    let block_size = u64::from(block_size);
    if fragment_index == NO_FRAGMENT {
        Ok(file_size.div_ceil(block_size))
    } else {
        Ok(file_size / block_size)
    }
}

fn decode_header(cursor: &mut StreamCursor<'_>) -> Result<InodeHeader> {
    Ok(InodeHeader {
        type_id: cursor.u16()?,
        permissions: cursor.u16()?,
        uid_index: cursor.u16()?,
        gid_index: cursor.u16()?,
        modification_time: cursor.u32()?,
        inode_number: cursor.u32()?,
    })
}

fn decode_directory(cursor: &mut StreamCursor<'_>) -> Result<InodeKind> {
    Ok(InodeKind::Directory {
        start_block: cursor.u32()?,
        link_count: cursor.u32()?,
        file_size: cursor.u16()?,
        offset: cursor.u16()?,
        parent_inode: cursor.u32()?,
    })
}

fn decode_file(cursor: &mut StreamCursor<'_>, params: &ImageParams) -> Result<InodeKind> {
    let blocks_start = cursor.u32()?;
    let fragment_index = cursor.u32()?;
    let fragment_offset = cursor.u32()?;
    let file_size = cursor.u32()?;

    // Check the whole list fits before allocating for it
    let count = block_count(file_size, params.block_size, fragment_index)?;
    let list_len = usize::try_from(count * 4).unwrap_or(usize::MAX);
    let list = cursor.bytes(list_len)?;
    let block_sizes = list
        .chunks_exact(4)
        .map(|b| params.endianness.read_u32(b))
        .collect();

    Ok(InodeKind::File {
        blocks_start,
        fragment_index,
        fragment_offset,
        file_size,
        block_sizes,
    })
}

fn decode_symlink(cursor: &mut StreamCursor<'_>) -> Result<InodeKind> {
    let link_count = cursor.u32()?;
    let target_size = cursor.u32()?;
    let target_len = usize::try_from(target_size).unwrap_or(usize::MAX);
    let target = String::from_utf8_lossy(cursor.bytes(target_len)?).into_owned();
    Ok(InodeKind::Symlink { link_count, target })
}

fn decode_inode(cursor: &mut StreamCursor<'_>, params: &ImageParams) -> Result<Inode> {
    let position = cursor.position();
    let header = decode_header(cursor)?;

    let inode_type = InodeType::from_id(header.type_id).ok_or(SquashError::UnknownInodeType {
        type_id: header.type_id,
    })?;

    let kind = match inode_type {
        InodeType::BasicDirectory => decode_directory(cursor)?,
        InodeType::BasicFile => decode_file(cursor, params)?,
        InodeType::BasicSymlink => decode_symlink(cursor)?,
        // Records are not self-terminating; a guessed skip would misalign
        // every inode after this one.
        other => {
            return Err(SquashError::UnsupportedInodeType {
                type_id: header.type_id,
                name: other.name(),
            })
        }
    };

    Ok(Inode {
        header,
        position,
        kind,
    })
}

/// Decode exactly `inode_count` inodes from the inode table stream
pub fn decode_inode_table(data: &[u8], inode_count: u32, params: &ImageParams) -> Result<Vec<Inode>> {
    let mut cursor = StreamCursor::new(data, params.endianness, "inode table");

    // Bound the reservation by what the stream could possibly hold
    let capacity = (inode_count as usize).min(data.len() / INODE_HEADER_SIZE);
    let mut inodes = Vec::with_capacity(capacity);

    for _ in 0..inode_count {
        inodes.push(decode_inode(&mut cursor, params)?);
    }

    if !cursor.is_exhausted() {
        tracing::debug!(
            "Inode table has {} trailing bytes after {} inodes",
            cursor.remaining(),
            inode_count
        );
    }

    tracing::info!("Decoded {} inodes", inodes.len());
    Ok(inodes)
}
