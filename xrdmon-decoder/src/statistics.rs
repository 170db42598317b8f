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

use crate::header::PacketKind;
use crate::record::TraceKind;
use crate::subrecord::Skip;

/// Diagnostic counters kept by the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStatistics {
    /// Packets handed to `decode`, including ones that were discarded
    pub packets_received: u64,
    pub dictionary_packets: u64,
    pub trace_packets: u64,
    pub user_packets: u64,
    /// Packets dropped because their kind code is not recognised
    pub unknown_packets: u64,
    /// Packets dropped because the header or fixed payload is unusable
    pub malformed_packets: u64,
    /// Packets ignored because the decoder was stopped
    pub ignored_after_stop: u64,

    /// Sequence values skipped across all senders
    pub lost_packets: u64,
    pub duplicate_packets: u64,

    pub dictionary_entries: u64,
    pub user_entries: u64,
    pub read_write_records: u64,
    pub open_records: u64,
    pub close_records: u64,
    pub disconnect_records: u64,

    /// Sub-records or entries whose dictionary id lies outside the active range
    pub out_of_range_ids: u64,
    pub unknown_subrecords: u64,
    /// Partial entries at the tail of a trace packet
    pub truncated_subrecords: u64,
    /// Trace packets whose final window has no closing mark
    pub unterminated_windows: u64,
}

impl DecoderStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet_received(&mut self, kind: PacketKind) {
        self.packets_received += 1;
        match kind {
            PacketKind::Dictionary => self.dictionary_packets += 1,
            PacketKind::Trace => self.trace_packets += 1,
            PacketKind::User => self.user_packets += 1,
            PacketKind::Unknown(_) => self.unknown_packets += 1,
        }
    }

    pub fn trace_decoded(&mut self, kind: TraceKind) {
        match kind {
            TraceKind::ReadWrite => self.read_write_records += 1,
            TraceKind::Open => self.open_records += 1,
            TraceKind::Close => self.close_records += 1,
            TraceKind::Disconnect => self.disconnect_records += 1,
        }
    }

    pub fn subrecord_skipped(&mut self, skip: Skip) {
        match skip {
            Skip::OutOfRange(_) => self.out_of_range_ids += 1,
            Skip::UnknownTag(_) => self.unknown_subrecords += 1,
        }
    }

    pub fn trace_records(&self) -> u64 {
        self.read_write_records + self.open_records + self.close_records + self.disconnect_records
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
