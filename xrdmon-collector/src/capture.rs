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

//! Capture files: raw monitoring packets stored back to back.
//!
//! No framing is added; each packet's header `len` gives its size.

use thiserror::Error;
use xrdmon_decoder::{PacketHeader, HEADER_LEN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Corrupt capture at byte {offset}: packet declares length {len}")]
    Corrupt { offset: usize, len: u16 },

    #[error("Capture ends inside a packet at byte {offset}: {available} of {needed} bytes")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Iterator over the packets of a capture
pub struct CaptureSplitter<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> CaptureSplitter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for CaptureSplitter<'a> {
    type Item = Result<&'a [u8], CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }

        let rest = &self.buf[self.pos..];
        let header = match PacketHeader::parse(rest) {
            Ok(header) => header,
            Err(_) => {
                self.failed = true;
                return Some(Err(CaptureError::Truncated {
                    offset: self.pos,
                    needed: HEADER_LEN,
                    available: rest.len(),
                }));
            }
        };

        let len = usize::from(header.len);
        if len < HEADER_LEN {
            self.failed = true;
            return Some(Err(CaptureError::Corrupt {
                offset: self.pos,
                len: header.len,
            }));
        }
        if len > rest.len() {
            self.failed = true;
            return Some(Err(CaptureError::Truncated {
                offset: self.pos,
                needed: len,
                available: rest.len(),
            }));
        }

        self.pos += len;
        Some(Ok(&rest[..len]))
    }
}
