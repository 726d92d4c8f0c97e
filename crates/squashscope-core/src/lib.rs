use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub mod fs;

pub use error::{Result, SquashError};
pub use fs::common::{BlockDevice, ByteSource};
pub use fs::squashfs::{
    Compression, CompressionRegistry, Decompressor, DirectoryEntry, Endianness, IdTable,
    ImageContents, Inode, InodeKind, ReaderConfig, SquashfsReader, Superblock,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSystemType {
    Squashfs,
}

impl std::fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSystemType::Squashfs => write!(f, "SquashFS"),
        }
    }
}

/// Decode superblock, inodes and directory entries from any byte source
pub fn read_image<S: ByteSource>(source: S) -> Result<ImageContents> {
    read_image_with_config(source, ReaderConfig::default())
}

pub fn read_image_with_config<S: ByteSource>(source: S, config: ReaderConfig) -> Result<ImageContents> {
    SquashfsReader::with_config(source, config)?.read_all()
}

/// Open an image file and decode it
pub fn open_image(image_path: &Path) -> anyhow::Result<ImageContents> {
    tracing::info!("Reading {}", image_path.display());
    let device = BlockDevice::open(image_path)?;
    let contents = read_image(device.cursor())?;

    tracing::info!(
        "Read complete: {} inodes, {} directory entries",
        contents.inodes.len(),
        contents.entries.len()
    );
    Ok(contents)
}
