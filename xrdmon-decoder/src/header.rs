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

use serde::{Deserialize, Serialize};

use crate::error::HeaderError;

/// Size of the fixed header carried by every monitoring packet
pub const HEADER_LEN: usize = 8;

/// Packet type codes as they appear in the first header byte
pub const CODE_DICTIONARY: u8 = b'd';
pub const CODE_TRACE: u8 = b't';
pub const CODE_USER: u8 = b'u';

/// Monitoring packet header
///
/// ```text
/// 0        1        2                 4                                 8
/// +--------+--------+-----------------+---------------------------------+
/// |  code  |  seq   |   len (u16 BE)  |     server start (i32 BE)       |
/// +--------+--------+-----------------+---------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Packet type code
    pub code: u8,
    /// Per-sender sequence number, wraps at 256
    pub seq: u8,
    /// Length of the whole packet including this header
    pub len: u16,
    /// Start time of the emitting server process (unix seconds)
    pub server_start: i32,
}

impl PacketHeader {
    pub fn new(code: u8, seq: u8, len: u16, server_start: i32) -> Self {
        Self {
            code,
            seq,
            len,
            server_start,
        }
    }

    /// Parse the header from the start of a raw packet
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_LEN {
            return Err(HeaderError::Truncated(buf.len()));
        }

        Ok(Self {
            code: buf[0],
            seq: buf[1],
            len: u16::from_be_bytes([buf[2], buf[3]]),
            server_start: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.code;
        out[1] = self.seq;
        out[2..4].copy_from_slice(&self.len.to_be_bytes());
        out[4..8].copy_from_slice(&self.server_start.to_be_bytes());
        out
    }

    pub fn kind(&self) -> PacketKind {
        PacketKind::from(self.code)
    }

    /// Number of payload bytes the header declares, if the length is sane
    pub fn payload_len(&self) -> Result<usize, HeaderError> {
        (self.len as usize)
            .checked_sub(HEADER_LEN)
            .ok_or(HeaderError::LengthTooShort(self.len))
    }
}

/// Packet classification, decided once from the header code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    Dictionary,
    Trace,
    User,
    Unknown(u8),
}

impl PacketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Dictionary => "dictionary",
            PacketKind::Trace => "trace",
            PacketKind::User => "user",
            PacketKind::Unknown(_) => "unknown",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PacketKind::Dictionary => CODE_DICTIONARY,
            PacketKind::Trace => CODE_TRACE,
            PacketKind::User => CODE_USER,
            PacketKind::Unknown(code) => code,
        }
    }
}

impl From<u8> for PacketKind {
    fn from(code: u8) -> Self {
        match code {
            CODE_DICTIONARY => PacketKind::Dictionary,
            CODE_TRACE => PacketKind::Trace,
            CODE_USER => PacketKind::User,
            other => PacketKind::Unknown(other),
        }
    }
}
