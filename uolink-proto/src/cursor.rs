//! Zero-copy reader for the binary frames inside the envelope.

use std::fmt;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur while reading a binary frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Ran out of bytes before the field was fully read.
    UnexpectedEof,
    /// Read a TLV tag that doesn't match the expected one.
    UnexpectedTag {
        /// The tag found in the stream.
        found: u8,
        /// The tag the frame required at this position.
        expected: u8,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of frame"),
            Self::UnexpectedTag { found, expected } => {
                write!(f, "unexpected tag {found:#04x} (wanted {expected:#04x})")
            }
        }
    }
}
impl std::error::Error for Error {}

/// Specialized `Result` for frame reading.
pub type Result<T> = std::result::Result<T, Error>;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// A cursor over an in-memory frame. All multi-byte fields are big-endian.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize { self.pos }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        match self.buf.get(self.pos).copied() {
            Some(b) => { self.pos += 1; Ok(b) }
            None    => Err(Error::UnexpectedEof),
        }
    }

    /// Read a 16-bit big-endian integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(b))
    }

    /// Read a 32-bit big-endian integer.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(b))
    }

    /// Read a 64-bit big-endian integer.
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_array::<8>()?;
        Ok(u64::from_be_bytes(b))
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        if end > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    /// Read exactly `n` bytes as a slice of the underlying buffer.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Require the next byte to be `tag`.
    pub fn expect_tag(&mut self, tag: u8) -> Result<()> {
        let found = self.read_u8()?;
        if found == tag {
            Ok(())
        } else {
            Err(Error::UnexpectedTag { found, expected: tag })
        }
    }

    /// Read a `tag ‖ len(2B) ‖ value` record, requiring `tag`.
    pub fn read_tlv(&mut self, tag: u8) -> Result<&'a [u8]> {
        self.expect_tag(tag)?;
        let len = self.read_u16()?;
        self.read_slice(usize::from(len))
    }
}
