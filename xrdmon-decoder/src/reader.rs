/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Bounds-checked big-endian cursor over untrusted packet bytes.

/// A read ran past the end of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortRead {
    pub field: &'static str,
    pub needed: usize,
    pub available: usize,
}

pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_array<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N], ShortRead> {
        if self.remaining() < N {
            return Err(ShortRead {
                field,
                needed: N,
                available: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ShortRead> {
        self.read_array::<4>(field).map(u32::from_be_bytes)
    }

    /// Consume everything left as text.
    ///
    /// Servers pad strings with NULs; anything from the first NUL on is
    /// dropped and invalid UTF-8 is replaced rather than rejected.
    pub fn read_text(&mut self) -> String {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut reader = PayloadReader::new(&[0, 0, 1, 2, 9]);
        assert_eq!(reader.read_u32("dict_id").unwrap(), 0x0102);
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_short_read_reports_field() {
        let mut reader = PayloadReader::new(&[1, 2]);
        let err = reader.read_u32("dict_id").unwrap_err();
        assert_eq!(err.field, "dict_id");
        assert_eq!(err.needed, 4);
        assert_eq!(err.available, 2);
        // A failed read does not advance the cursor
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_text_stops_at_nul() {
        let mut reader = PayloadReader::new(b"alice.12:3@host\0\0garbage");
        assert_eq!(reader.read_text(), "alice.12:3@host");
        assert_eq!(reader.remaining(), 0);
    }
}
