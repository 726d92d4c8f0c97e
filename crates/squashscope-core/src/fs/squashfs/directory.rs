/// SquashFS directory table decoding
///
/// A directory listing is a run of headers, each followed by its entries:
/// - header: entry count - 1 (u32), inode table block (u32), inode number base (u32)
/// - entry: inode block offset (u16), inode number delta (i16), type (u16),
///   name size - 1 (u16), name bytes
///
/// Listings of all directories are stored back to back, so the decoder
/// simply runs until the logical stream is exhausted.
use serde::Serialize;

use super::cursor::StreamCursor;
use super::superblock::ImageParams;
use crate::error::Result;

/// Size of a listing header
pub const DIR_HEADER_SIZE: usize = 12;

/// Fixed part of a directory entry, before the name
pub const DIR_ENTRY_SIZE: usize = 8;

/// Directory `file_size` counts 3 bytes more than the listing occupies
pub const DIR_SIZE_BIAS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Logical offset of the listing header this entry was scoped by
    pub listing_offset: usize,
    pub inode_number: u32,
    pub name: String,
    /// Basic inode type id of the target
    pub entry_type: u16,
}

struct ListingHeader {
    count: u64,
    inode_base: u32,
}

fn decode_listing_header(cursor: &mut StreamCursor<'_>) -> Result<ListingHeader> {
    let count = u64::from(cursor.u32()?) + 1;
    // Inode table block of the entries; positional only
    let _start_block = cursor.u32()?;
    let inode_base = cursor.u32()?;
    Ok(ListingHeader { count, inode_base })
}

fn decode_entry(
    cursor: &mut StreamCursor<'_>,
    listing_offset: usize,
    inode_base: u32,
) -> Result<DirectoryEntry> {
    let _inode_offset = cursor.u16()?;
    let delta = cursor.i16()?;
    let entry_type = cursor.u16()?;
    let name_len = usize::from(cursor.u16()?) + 1;
    let name = String::from_utf8_lossy(cursor.bytes(name_len)?).into_owned();

    Ok(DirectoryEntry {
        listing_offset,
        inode_number: inode_base.wrapping_add_signed(i32::from(delta)),
        name,
        entry_type,
    })
}

/// Decode every listing in the directory table stream into one flat list
pub fn decode_directory_table(data: &[u8], params: &ImageParams) -> Result<Vec<DirectoryEntry>> {
    let mut cursor = StreamCursor::new(data, params.endianness, "directory table");
    let mut entries = Vec::new();
    let mut listings = 0usize;

    while !cursor.is_exhausted() {
        let listing_offset = cursor.position();
        let header = decode_listing_header(&mut cursor)?;
        tracing::debug!(
            "Listing at {}: {} entries from inode {}",
            listing_offset,
            header.count,
            header.inode_base
        );

        // Each entry consumes at least DIR_ENTRY_SIZE + 1 bytes, so a bogus
        // count fails on the first short read rather than looping on.
        for _ in 0..header.count {
            entries.push(decode_entry(&mut cursor, listing_offset, header.inode_base)?);
        }
        listings += 1;
    }

    tracing::info!(
        "Decoded {} directory entries in {} listings",
        entries.len(),
        listings
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SquashError;
    use crate::fs::squashfs::cursor::Endianness;
    use crate::fs::squashfs::superblock::Compression;

    const PARAMS: ImageParams = ImageParams {
        endianness: Endianness::Little,
        block_size: 4096,
        compression: Compression::Gzip,
    };

    fn listing(base: u32, entries: &[(i16, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as u32 - 1).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&base.to_le_bytes());
        for (delta, name) in entries {
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&delta.to_le_bytes());
            out.extend_from_slice(&2u16.to_le_bytes());
            out.extend_from_slice(&(name.len() as u16 - 1).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    #[test]
    fn test_negative_delta() {
        let data = listing(100, &[(-5, "back")]);
        let entries = decode_directory_table(&data, &PARAMS).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].inode_number, 95);
    }

    #[test]
    fn test_name_length_is_stored_minus_one() {
        let data = listing(1, &[(0, "a"), (1, "hello world!")]);
        let entries = decode_directory_table(&data, &PARAMS).unwrap();
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[1].name.len(), 12);
        assert_eq!(entries[1].name, "hello world!");

        // Raw field check: 0 and 11 on disk
        assert_eq!(&data[DIR_HEADER_SIZE + 6..DIR_HEADER_SIZE + 8], &[0, 0]);
        let second = DIR_HEADER_SIZE + DIR_ENTRY_SIZE + 1;
        assert_eq!(&data[second + 6..second + 8], &[11, 0]);
    }

    #[test]
    fn test_multiple_listings_flattened() {
        let mut data = listing(10, &[(0, "x"), (1, "y")]);
        let second = data.len();
        data.extend(listing(50, &[(3, "z")]));

        let entries = decode_directory_table(&data, &PARAMS).unwrap();
        let numbers: Vec<u32> = entries.iter().map(|e| e.inode_number).collect();
        assert_eq!(numbers, vec![10, 11, 53]);
        assert_eq!(entries[0].listing_offset, 0);
        assert_eq!(entries[2].listing_offset, second);
        assert_eq!(entries[2].entry_type, 2);
    }

    #[test]
    fn test_big_endian_listing() {
        let mut data = Vec::new();
        for v in [0u32, 0, 300] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&(-1i16).to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(b"etc");

        let params = ImageParams {
            endianness: Endianness::Big,
            ..PARAMS
        };
        let entries = decode_directory_table(&data, &params).unwrap();
        assert_eq!(entries[0].inode_number, 299);
        assert_eq!(entries[0].name, "etc");
    }

    #[test]
    fn test_empty_stream() {
        assert!(decode_directory_table(&[], &PARAMS).unwrap().is_empty());
    }

    #[test]
    fn test_short_name_is_truncated() {
        let mut data = listing(1, &[(0, "abcdef")]);
        data.truncate(data.len() - 2);
        assert!(matches!(
            decode_directory_table(&data, &PARAMS),
            Err(SquashError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_count_larger_than_stream() {
        let mut data = listing(1, &[(0, "a")]);
        data[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_directory_table(&data, &PARAMS),
            Err(SquashError::TruncatedInput { .. })
        ));
    }
}
