/// Errors raised while decoding a SquashFS image
///
/// Every variant is produced at the point of decode and propagated as-is.
/// A failed read never yields partial superblock, inode or directory data.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SquashError>;

#[derive(Debug, Error)]
pub enum SquashError {
    /// A length field demanded more bytes than the input holds
    #[error("truncated input while reading {context}: needed {needed} bytes at offset {offset}")]
    TruncatedInput {
        context: &'static str,
        offset: u64,
        needed: usize,
    },

    /// Neither byte order produced the "hsqs" signature
    #[error("invalid magic {found:02x?}: not a SquashFS image in either byte order")]
    InvalidMagic { found: [u8; 4] },

    #[error("unsupported SquashFS version {major}.{minor} (only 4.x is supported)")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Compression id is unknown, or no decompressor is registered for it
    #[error("unsupported compression algorithm id {id}")]
    UnsupportedCompression { id: u16 },

    #[error("unknown inode type {type_id}")]
    UnknownInodeType { type_id: u16 },

    /// Recognized inode type whose layout this decoder does not implement
    #[error("inode type {type_id} ({name}) is recognized but not supported")]
    UnsupportedInodeType { type_id: u16, name: &'static str },

    #[error("invalid block size {block_size}: must be a non-zero power of two")]
    InvalidBlockSize { block_size: u32 },

    /// A metadata block could not be inflated or inflated to an invalid size
    #[error("corrupt metadata block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SquashError {
    pub(crate) fn truncated(context: &'static str, offset: u64, needed: usize) -> Self {
        SquashError::TruncatedInput {
            context,
            offset,
            needed,
        }
    }
}
