/// Endian-aware, bounds-checked reads over a decoded byte stream
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{Result, SquashError};

/// Byte order detected from the superblock magic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endianness::Little => LittleEndian::read_u16(buf),
            Endianness::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endianness::Little => LittleEndian::read_u32(buf),
            Endianness::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endianness::Little => LittleEndian::read_u64(buf),
            Endianness::Big => BigEndian::read_u64(buf),
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endianness::Little => write!(f, "little-endian"),
            Endianness::Big => write!(f, "big-endian"),
        }
    }
}

/// Cursor over a logical stream. Every read checks the remaining length
/// first and reports the stream offset on failure.
pub struct StreamCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endianness: Endianness,
    context: &'static str,
}

impl<'a> StreamCursor<'a> {
    pub fn new(data: &'a [u8], endianness: Endianness, context: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            endianness,
            context,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Take the next `len` bytes
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SquashError::truncated(self.context, self.pos as u64, len));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let endianness = self.endianness;
        self.bytes(2).map(|b| endianness.read_u16(b))
    }

    pub fn i16(&mut self) -> Result<i16> {
        self.u16().map(|v| v as i16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let endianness = self.endianness;
        self.bytes(4).map(|b| endianness.read_u32(b))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let endianness = self.endianness;
        self.bytes(8).map(|b| endianness.read_u64(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_follow_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = StreamCursor::new(&data, Endianness::Little, "test");
        assert_eq!(le.u16().unwrap(), 0x0201);
        let mut be = StreamCursor::new(&data, Endianness::Big, "test");
        assert_eq!(be.u32().unwrap(), 0x01020304);
        assert!(be.is_exhausted());
    }

    #[test]
    fn test_signed_read() {
        let data = (-5i16).to_le_bytes();
        let mut cursor = StreamCursor::new(&data, Endianness::Little, "test");
        assert_eq!(cursor.i16().unwrap(), -5);
    }

    #[test]
    fn test_short_read_reports_position() {
        let data = [0u8; 6];
        let mut cursor = StreamCursor::new(&data, Endianness::Little, "inode table");
        cursor.u32().unwrap();
        match cursor.u32() {
            Err(SquashError::TruncatedInput {
                context,
                offset,
                needed,
            }) => {
                assert_eq!(context, "inode table");
                assert_eq!(offset, 4);
                assert_eq!(needed, 4);
            }
            other => panic!("expected TruncatedInput, got {:?}", other),
        }
        // A failed read does not advance
        assert_eq!(cursor.position(), 4);
    }
}
