//! Checked read cursor over an inbound message buffer.
//!
//! Replaces raw offset arithmetic: every read validates the remaining
//! length first, so a length field larger than the buffer turns into a
//! typed error instead of an over-read.

use super::WireError;

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if n > self.remaining() {
            return Err(WireError::Malformed(format!(
                "need {} bytes at offset {}, only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an i32 that is used as a length or count; negative values are
    /// rejected here so callers can work in `usize`.
    pub fn read_count(&mut self, what: &str) -> Result<usize, WireError> {
        let raw = self.read_i32()?;
        if raw < 0 {
            return Err(WireError::Malformed(format!("negative {what}: {raw}")));
        }
        Ok(raw as usize)
    }

    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn read_cstr(&mut self) -> Result<String, WireError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| WireError::Malformed("unterminated name string".into()))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| WireError::Malformed("name is not valid UTF-8".into()))?
            .to_string();
        self.pos += nul + 1;
        Ok(s)
    }
}
