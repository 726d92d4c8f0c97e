/// Seekable byte source consumed by the decoding pipeline
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::error::{Result, SquashError};

/// The only capability the decoder needs from an image: move to an absolute
/// offset and read an exact number of bytes from there.
pub trait ByteSource {
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Read exactly `len` bytes, failing with `TruncatedInput` when the
    /// source ends first.
    fn read_exactly(&mut self, len: usize) -> Result<Vec<u8>>;
}

impl<T: Read + Seek> ByteSource for T {
    fn seek(&mut self, offset: u64) -> Result<()> {
        Seek::seek(self, SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_exactly(&mut self, len: usize) -> Result<Vec<u8>> {
        let offset = self.stream_position()?;
        let mut buf = vec![0u8; len];
        match self.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(SquashError::truncated("byte source", offset, len))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_exactly_after_seek() {
        let mut source = Cursor::new(vec![0u8, 1, 2, 3, 4, 5]);
        ByteSource::seek(&mut source, 2).unwrap();
        assert_eq!(source.read_exactly(3).unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_short_read_is_truncated_input() {
        let mut source = Cursor::new(vec![0u8; 4]);
        ByteSource::seek(&mut source, 2).unwrap();
        match source.read_exactly(8) {
            Err(SquashError::TruncatedInput { offset, needed, .. }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 8);
            }
            other => panic!("expected TruncatedInput, got {:?}", other),
        }
    }
}
