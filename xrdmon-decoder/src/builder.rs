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

//! Encoders for monitoring packets, used to build fixtures and captures.

use crate::header::{PacketHeader, CODE_DICTIONARY, CODE_TRACE, CODE_USER, HEADER_LEN};
use crate::record::DictId;
use crate::subrecord::{ENTRY_LEN, TAG_CLOSE, TAG_DISCONNECT, TAG_OPEN, TAG_WINDOW};

/// Builds single trace entries
pub struct TraceEntryBuilder;

impl TraceEntryBuilder {
    fn entry(arg0: u64, arg1: u32, arg2: u32) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        out[0..8].copy_from_slice(&arg0.to_be_bytes());
        out[8..12].copy_from_slice(&arg1.to_be_bytes());
        out[12..16].copy_from_slice(&arg2.to_be_bytes());
        out
    }

    fn tagged(tag: u8, b1: u8, b2: u8, low: u64) -> u64 {
        (u64::from(tag) << 56) | (u64::from(b1) << 48) | (u64::from(b2) << 40) | low
    }

    /// Read request. `offset` must stay below 2^55 for the tag bit to remain clear.
    pub fn read(offset: u64, length: u32, dict_id: DictId) -> [u8; ENTRY_LEN] {
        Self::entry(offset & 0x007f_ffff_ffff_ffff, length, dict_id)
    }

    pub fn write(offset: u64, length: u32, dict_id: DictId) -> [u8; ENTRY_LEN] {
        Self::entry(
            offset & 0x007f_ffff_ffff_ffff,
            (length as i32).wrapping_neg() as u32,
            dict_id,
        )
    }

    pub fn open(flags: u8, file_size: u64, dict_id: DictId) -> [u8; ENTRY_LEN] {
        let arg0 = (u64::from(TAG_OPEN) << 56)
            | (u64::from(flags) << 48)
            | (file_size & 0x0000_ffff_ffff_ffff);
        Self::entry(arg0, 0, dict_id)
    }

    pub fn close(bytes_read: u32, bytes_written: u32, dict_id: DictId) -> [u8; ENTRY_LEN] {
        Self::close_shifted(bytes_read, 0, bytes_written, 0, dict_id)
    }

    /// Close with totals already scaled down by their shifts
    pub fn close_shifted(
        read_total: u32,
        read_shift: u8,
        write_total: u32,
        write_shift: u8,
        dict_id: DictId,
    ) -> [u8; ENTRY_LEN] {
        let arg0 = Self::tagged(TAG_CLOSE, read_shift, write_shift, u64::from(read_total));
        Self::entry(arg0, write_total, dict_id)
    }

    pub fn disconnect(flags: u8, duration_secs: u32, dict_id: DictId) -> [u8; ENTRY_LEN] {
        let arg0 = Self::tagged(TAG_DISCONNECT, flags, 0, 0);
        Self::entry(arg0, duration_secs, dict_id)
    }

    /// Window mark closing a window at `end_time` and opening one at `next_begin`
    pub fn window(end_time: u32, next_begin: u32) -> [u8; ENTRY_LEN] {
        Self::entry(u64::from(TAG_WINDOW) << 56, end_time, next_begin)
    }

    /// Entries for one complete window: opening mark, `records`, closing mark
    pub fn single_window(
        begin_time: u32,
        end_time: u32,
        records: &[[u8; ENTRY_LEN]],
    ) -> Vec<[u8; ENTRY_LEN]> {
        let mut entries = Vec::with_capacity(records.len() + 2);
        entries.push(Self::window(begin_time, begin_time));
        entries.extend_from_slice(records);
        entries.push(Self::window(end_time, end_time));
        entries
    }
}

/// Builds whole packets with a running sequence number
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    seq: u8,
    server_start: i32,
}

impl PacketBuilder {
    pub fn new(server_start: i32) -> Self {
        Self {
            seq: 0,
            server_start,
        }
    }

    pub fn starting_at_seq(mut self, seq: u8) -> Self {
        self.seq = seq;
        self
    }

    /// Sequence number the next packet will carry
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// Drop `count` sequence numbers, as if those packets were lost
    pub fn skip(&mut self, count: u8) {
        self.seq = self.seq.wrapping_add(count);
    }

    pub fn raw(&mut self, code: u8, payload: &[u8]) -> Vec<u8> {
        let total = HEADER_LEN + payload.len();
        let header = PacketHeader::new(
            code,
            self.seq,
            u16::try_from(total).unwrap_or(u16::MAX),
            self.server_start,
        );
        self.seq = self.seq.wrapping_add(1);

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn trace(&mut self, entries: &[[u8; ENTRY_LEN]]) -> Vec<u8> {
        let payload: Vec<u8> = entries.iter().flatten().copied().collect();
        self.raw(CODE_TRACE, &payload)
    }

    pub fn dictionary(&mut self, dict_id: DictId, text: &str) -> Vec<u8> {
        self.raw(CODE_DICTIONARY, &Self::id_and_text(dict_id, text))
    }

    pub fn user(&mut self, dict_id: DictId, text: &str) -> Vec<u8> {
        self.raw(CODE_USER, &Self::id_and_text(dict_id, text))
    }

    fn id_and_text(dict_id: DictId, text: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4 + text.len());
        payload.extend_from_slice(&dict_id.to_be_bytes());
        payload.extend_from_slice(text.as_bytes());
        payload
    }
}
