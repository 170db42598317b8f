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

//! Decoders for the fixed-size entries of a trace packet.
//!
//! ```text
//! 0      1                               8               12              16
//! +------+-------------------------------+---------------+---------------+
//! | tag  |          arg0 (rest)          |  arg1 (BE)    |  arg2 (BE)    |
//! +------+-------------------------------+---------------+---------------+
//! ```
//!
//! A tag below `0x80` marks a read/write request, in which case the tag byte
//! is the high byte of the 64-bit offset in `arg0`.

use crate::record::{
    CloseRecord, DictId, DisconnectRecord, OpenRecord, ReadWriteRecord, TraceRecord,
};
use crate::state::DictIdRange;

pub const ENTRY_LEN: usize = 16;

/// Tags with this bit clear are read/write requests
pub const RW_REQUEST_MASK: u8 = 0x80;
pub const TAG_OPEN: u8 = 0x80;
pub const TAG_APPID: u8 = 0xa0;
pub const TAG_CLOSE: u8 = 0xc0;
pub const TAG_DISCONNECT: u8 = 0xd0;
pub const TAG_WINDOW: u8 = 0xe0;

const FILE_SIZE_MASK: u64 = 0x0000_ffff_ffff_ffff;

/// One raw trace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry([u8; ENTRY_LEN]);

impl TraceEntry {
    pub fn new(bytes: [u8; ENTRY_LEN]) -> Self {
        Self(bytes)
    }

    /// `None` unless `bytes` is exactly one entry long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn tag(&self) -> u8 {
        self.0[0]
    }

    pub fn arg0(&self) -> u64 {
        u64::from_be_bytes([
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7],
        ])
    }

    pub fn arg0_byte(&self, index: usize) -> u8 {
        self.0[index]
    }

    pub fn arg1(&self) -> u32 {
        u32::from_be_bytes([self.0[8], self.0[9], self.0[10], self.0[11]])
    }

    pub fn arg2(&self) -> u32 {
        u32::from_be_bytes([self.0[12], self.0[13], self.0[14], self.0[15]])
    }

    pub fn dict_id(&self) -> DictId {
        self.arg2()
    }
}

/// Why an entry produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OutOfRange(DictId),
    UnknownTag(u8),
}

/// Decode one entry, dispatching on its tag.
///
/// Window marks are consumed by the window calculator and never reach here;
/// if one does it is reported as an unknown tag.
pub fn decode_entry(
    entry: &TraceEntry,
    timestamp: i64,
    range: &DictIdRange,
) -> Result<TraceRecord, Skip> {
    let tag = entry.tag();
    if tag & RW_REQUEST_MASK == 0 {
        return decode_rw_request(entry, timestamp, range);
    }
    match tag {
        TAG_OPEN => decode_open(entry, timestamp, range),
        TAG_CLOSE => decode_close(entry, timestamp, range),
        TAG_DISCONNECT => decode_disconnect(entry, timestamp, range),
        other => Err(Skip::UnknownTag(other)),
    }
}

fn checked_id(entry: &TraceEntry, range: &DictIdRange) -> Result<DictId, Skip> {
    let dict_id = entry.dict_id();
    if range.contains(dict_id) {
        Ok(dict_id)
    } else {
        Err(Skip::OutOfRange(dict_id))
    }
}

pub fn decode_rw_request(
    entry: &TraceEntry,
    timestamp: i64,
    range: &DictIdRange,
) -> Result<TraceRecord, Skip> {
    let dict_id = checked_id(entry, range)?;
    Ok(TraceRecord::ReadWrite(ReadWriteRecord {
        dict_id,
        timestamp,
        offset: entry.arg0() as i64,
        length: entry.arg1() as i32,
    }))
}

pub fn decode_open(
    entry: &TraceEntry,
    timestamp: i64,
    range: &DictIdRange,
) -> Result<TraceRecord, Skip> {
    let dict_id = checked_id(entry, range)?;
    Ok(TraceRecord::Open(OpenRecord {
        dict_id,
        timestamp,
        flags: entry.arg0_byte(1),
        file_size: entry.arg0() & FILE_SIZE_MASK,
    }))
}

/// Close totals are sent as 32-bit values scaled down by a per-record shift
pub fn decode_close(
    entry: &TraceEntry,
    timestamp: i64,
    range: &DictIdRange,
) -> Result<TraceRecord, Skip> {
    let dict_id = checked_id(entry, range)?;
    let read_shift = entry.arg0_byte(1);
    let write_shift = entry.arg0_byte(2);
    let read_total = (entry.arg0() & 0xffff_ffff) as u32;

    Ok(TraceRecord::Close(CloseRecord {
        dict_id,
        timestamp,
        bytes_read: unshift(read_total, read_shift),
        bytes_written: unshift(entry.arg1(), write_shift),
    }))
}

pub fn decode_disconnect(
    entry: &TraceEntry,
    timestamp: i64,
    range: &DictIdRange,
) -> Result<TraceRecord, Skip> {
    let dict_id = checked_id(entry, range)?;
    Ok(TraceRecord::Disconnect(DisconnectRecord {
        dict_id,
        timestamp,
        flags: entry.arg0_byte(1),
        duration_secs: entry.arg1() as i32,
    }))
}

/// Saturates when the shift would push bits past 64
fn unshift(value: u32, shift: u8) -> u64 {
    if value == 0 {
        return 0;
    }
    let value = u64::from(value);
    let shift = u32::from(shift);
    match value.checked_shl(shift) {
        Some(shifted) if shifted >> shift == value => shifted,
        _ => u64::MAX,
    }
}
