use bytebuffer::ByteBuffer;
use std::mem;

use crate::error::Result;

/// A fixed-size in-memory buffer with typed accessors at arbitrary byte
/// offsets. Used both as a data page (by the file/buffer layers) and as the
/// backing storage for one block of the write-ahead log.
///
/// Integers are 4-byte big-endian two's-complement. Byte runs and strings are
/// a 4-byte big-endian length prefix followed by the payload; strings are
/// ASCII, so `max_length(n) == 4 + n`.
#[derive(Debug)]
pub struct Page {
    buf: ByteBuffer,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: ByteBuffer::from_vec(vec![0; block_size]),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Page {
        Self {
            buf: ByteBuffer::from_vec(bytes),
        }
    }

    pub fn get_int(&mut self, offset: usize) -> Result<i32> {
        self.buf.set_rpos(offset);
        Ok(self.buf.read_i32()?)
    }

    pub fn set_int(&mut self, offset: usize, n: i32) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_i32(n);
        Ok(())
    }

    pub fn get_bytes(&mut self, offset: usize) -> Result<Vec<u8>> {
        self.buf.set_rpos(offset);
        let len = self.buf.read_i32()? as usize;
        Ok(self.buf.read_bytes(len)?)
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.buf.set_wpos(offset);
        self.buf.write_i32(bytes.len() as i32);
        self.buf.write_bytes(bytes);
        Ok(())
    }

    /// Strings are plain ASCII, encoded via [`Self::get_bytes`]/[`Self::set_bytes`]
    /// rather than any codec the backing byte buffer might supply natively —
    /// the length-prefixed run is the on-disk format, not an implementation
    /// detail of the `bytebuffer` crate.
    pub fn get_string(&mut self, offset: usize) -> Result<String> {
        let bytes = self.get_bytes(offset)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn set_string(&mut self, offset: usize, s: &str) -> Result<()> {
        self.set_bytes(offset, s.as_bytes())
    }

    /// Bytes needed to store a string of `strlen` ASCII characters, including
    /// its 4-byte length prefix.
    pub fn max_length(strlen: usize) -> usize {
        mem::size_of::<i32>() + (strlen * mem::size_of::<u8>())
    }

    /// A package-private method, needed by [`crate::file::manager::FileManager`]
    /// to read/write the whole block at once.
    pub(crate) fn contents(&mut self) -> &mut ByteBuffer {
        self.buf.set_rpos(0);
        &mut self.buf
    }

    /// Overwrite the entire page with `bytes` (must be exactly `block_size`
    /// long). Used when a block is read in from disk.
    pub(crate) fn load(&mut self, bytes: &[u8]) {
        self.buf.clear();
        self.buf.write_bytes(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::Page;

    #[test]
    fn int_roundtrip() {
        let mut p = Page::new(64);
        p.set_int(0, -42).unwrap();
        assert_eq!(p.get_int(0).unwrap(), -42);
    }

    #[test]
    fn string_roundtrip_respects_max_length() {
        let mut p = Page::new(64);
        let s = "hello, page";
        p.set_string(4, s).unwrap();
        assert_eq!(p.get_string(4).unwrap(), s);

        let next = 4 + Page::max_length(s.len());
        p.set_int(next, 7).unwrap();
        assert_eq!(p.get_int(next).unwrap(), 7);
    }

    #[test]
    fn bytes_roundtrip() {
        let mut p = Page::new(32);
        let data = vec![9u8, 8, 7, 6, 5];
        p.set_bytes(0, &data).unwrap();
        assert_eq!(p.get_bytes(0).unwrap(), data);
    }
}
