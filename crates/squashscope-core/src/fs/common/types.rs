/// Memory-mapped image access
use anyhow::Result;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

/// A memory-mapped image file for efficient large file access
pub struct BlockDevice {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
}

impl BlockDevice {
    /// Open an image file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        // SAFETY: the map is read-only and lives no longer than `_file`.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(BlockDevice {
            _file: file,
            mmap,
            size,
        })
    }

    /// Get the size of the image in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read a slice of bytes from the image
    pub fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let start = usize::try_from(offset)?;
        let end = start
            .checked_add(length)
            .ok_or_else(|| anyhow::anyhow!("Read range overflows: {} + {}", start, length))?;

        if end > self.mmap.len() {
            anyhow::bail!("Read beyond end of image: {} > {}", end, self.mmap.len());
        }

        Ok(&self.mmap[start..end])
    }

    /// A seekable view over the whole image, usable as a `ByteSource`
    pub fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.mmap[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::common::ByteSource;
    use std::io::Write;

    #[test]
    fn test_block_device_reads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hsqs0123456789").unwrap();
        file.flush().unwrap();

        let device = BlockDevice::open(file.path()).unwrap();
        assert_eq!(device.size(), 14);
        assert_eq!(device.read_bytes(0, 4).unwrap(), b"hsqs");
        assert!(device.read_bytes(10, 8).is_err());

        let mut cursor = device.cursor();
        ByteSource::seek(&mut cursor, 4).unwrap();
        assert_eq!(cursor.read_exactly(2).unwrap(), b"01".to_vec());
    }
}
