/// File system detection and module organization
use anyhow::Result;
use std::path::Path;

pub mod common;
pub mod squashfs;

use crate::FileSystemType;
use common::BlockDevice;

/// Detect file system type from an image
pub fn detect_filesystem(device_path: &Path) -> Result<Option<FileSystemType>> {
    let device = BlockDevice::open(device_path)?;

    // SquashFS superblock sits at offset 0
    if let Ok(header) = device.read_bytes(0, squashfs::SUPERBLOCK_SIZE) {
        if squashfs::is_squashfs_superblock(header) {
            return Ok(Some(FileSystemType::Squashfs));
        }
    }

    Ok(None)
}

/// Get human-readable file system information
pub fn get_filesystem_info(device_path: &Path, fs_type: FileSystemType) -> Result<String> {
    let device = BlockDevice::open(device_path)?;

    match fs_type {
        FileSystemType::Squashfs => squashfs::get_filesystem_info(&device),
    }
}
