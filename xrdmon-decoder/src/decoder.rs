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

use std::path::PathBuf;

use crate::header::{PacketHeader, PacketKind, HEADER_LEN};
use crate::log_sink::LogSink;
use crate::reader::PayloadReader;
use crate::record::{DictEntry, DictId, UserEntry};
use crate::sequence::{SenderId, SequenceCheck, SequenceTracker};
use crate::sink::Sink;
use crate::state::{DecoderPhase, DecoderState, DictIdRange, StopToken};
use crate::statistics::DecoderStatistics;
use crate::subrecord::{decode_entry, TraceEntry, ENTRY_LEN, TAG_WINDOW};
use crate::window::{prepare_timestamp, CalcTime, WindowMark};
use crate::{DecodeError, Result};

/// How the decoder is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderMode {
    /// Packets arrive live from the network
    RealTime,
    /// Recorded packets are replayed; decoding stops once a trace timestamp
    /// passes `up_to_time`
    Historical { up_to_time: Option<i64> },
}

/// Why a whole packet was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    TruncatedHeader,
    UnknownKind(u8),
    /// Declared length smaller than the header itself
    LengthTooShort,
    /// Dictionary or user packet without room for its id
    MissingDictId,
    /// Trace payload that does not open with a window mark
    MissingWindow,
    DictIdOutOfRange(DictId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Decoded,
    Discarded(DiscardReason),
    /// The decoder was already stopped; nothing was looked at
    IgnoredStopped,
    /// This packet carried the first trace past the replay bound
    ReachedStopBound,
}

/// What one call to `decode` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub kind: Option<PacketKind>,
    /// `None` when the packet was dropped before its sequence was checked
    pub sequence: Option<SequenceCheck>,
    /// Entries handed to the sink
    pub forwarded: usize,
    /// Sub-records discarded inside an otherwise usable packet
    pub skipped: usize,
    pub outcome: PacketOutcome,
}

impl DecodeReport {
    fn new(kind: Option<PacketKind>) -> Self {
        Self {
            kind,
            sequence: None,
            forwarded: 0,
            skipped: 0,
            outcome: PacketOutcome::Decoded,
        }
    }

    fn discarded(mut self, reason: DiscardReason) -> Self {
        self.outcome = PacketOutcome::Discarded(reason);
        self
    }

    pub fn lost(&self) -> u32 {
        self.sequence.map_or(0, |check| check.lost())
    }
}

/// Monitoring packet decoder
///
/// Owns the per-session state and pushes everything it reconstructs into a
/// [`Sink`]. One instance is driven by one loop; it does no locking.
pub struct PacketDecoder<S: Sink> {
    sink: S,
    mode: DecoderMode,
    state: DecoderState,
    sequences: SequenceTracker,
    stats: DecoderStatistics,
}

impl PacketDecoder<LogSink> {
    /// Live collection writing under `base_dir`, mirroring to `rt_log_dir`
    pub fn real_time(
        base_dir: impl Into<PathBuf>,
        rt_log_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let sink = LogSink::real_time(base_dir, rt_log_dir)?;
        Ok(Self::with_sink(sink, DecoderMode::RealTime))
    }

    /// Replay of recorded packets
    pub fn historical(
        base_dir: impl Into<PathBuf>,
        save_traces: bool,
        max_trace_log_size: u64,
        up_to_time: Option<i64>,
    ) -> Result<Self> {
        let sink = LogSink::history(base_dir, save_traces, max_trace_log_size)?;
        Ok(Self::with_sink(
            sink,
            DecoderMode::Historical { up_to_time },
        ))
    }
}

impl<S: Sink> PacketDecoder<S> {
    pub fn with_sink(sink: S, mode: DecoderMode) -> Self {
        Self {
            sink,
            mode,
            state: DecoderState::new(),
            sequences: SequenceTracker::new(),
            stats: DecoderStatistics::new(),
        }
    }

    /// Establish the active dictionary id range and bind the session to the
    /// server at `sender_host_port`. Required before the first `decode`.
    pub fn init(&mut self, min: DictId, max: DictId, sender_host_port: &str) -> Result<()> {
        let range = DictIdRange::new(min, max)?;
        log::info!("Decoder session for {sender_host_port}: dictionary ids {min}..={max}");
        self.state.init(range, sender_host_port);
        Ok(())
    }

    /// Give `sender` its own dictionary id range
    pub fn init_sender(
        &mut self,
        sender: SenderId,
        min: DictId,
        max: DictId,
        host_port: &str,
    ) -> Result<()> {
        let range = DictIdRange::new(min, max)?;
        log::info!("Registered {sender} at {host_port}: dictionary ids {min}..={max}");
        self.state.init_sender(sender, range, host_port);
        Ok(())
    }

    /// Parse the header from `packet` and decode it.
    ///
    /// A packet too short to hold a header is discarded like any other
    /// malformed packet.
    pub fn decode_raw(
        &mut self,
        packet: &[u8],
        sender: Option<SenderId>,
    ) -> Result<DecodeReport> {
        match PacketHeader::parse(packet) {
            Ok(header) => self.decode(&header, packet, sender),
            Err(e) => {
                self.require_session(sender)?;
                log::warn!("Discarding packet: {e}");
                self.stats.packets_received += 1;
                self.stats.malformed_packets += 1;
                Ok(DecodeReport::new(None).discarded(DiscardReason::TruncatedHeader))
            }
        }
    }

    /// Decode one packet. `packet` is the whole datagram, header included.
    pub fn decode(
        &mut self,
        header: &PacketHeader,
        packet: &[u8],
        sender: Option<SenderId>,
    ) -> Result<DecodeReport> {
        let range = self.require_session(sender)?;
        let kind = header.kind();
        let mut report = DecodeReport::new(Some(kind));

        if self.state.stop_requested() {
            self.stats.ignored_after_stop += 1;
            report.outcome = PacketOutcome::IgnoredStopped;
            return Ok(report);
        }

        self.stats.packet_received(kind);
        if let PacketKind::Unknown(code) = kind {
            log::warn!(
                "Discarding packet with unknown type code {code:#04x} (seq {})",
                header.seq
            );
            return Ok(report.discarded(DiscardReason::UnknownKind(code)));
        }

        let check = self.sequences.check(sender, header.seq);
        match check {
            SequenceCheck::Gap(event) => self.stats.lost_packets += u64::from(event.lost),
            SequenceCheck::Duplicate => self.stats.duplicate_packets += 1,
            SequenceCheck::First | SequenceCheck::InOrder => {}
        }
        report.sequence = Some(check);
        self.sink.set_last_seq(sender, header.seq);

        let payload_len = match header.payload_len() {
            Ok(len) => len,
            Err(e) => {
                log::warn!("Discarding {} packet: {e}", kind.as_str());
                self.stats.malformed_packets += 1;
                return Ok(report.discarded(DiscardReason::LengthTooShort));
            }
        };
        let end = (HEADER_LEN + payload_len).min(packet.len());
        if end < HEADER_LEN + payload_len {
            log::debug!(
                "{} packet seq {} truncated: declared {} bytes, received {}",
                kind.as_str(),
                header.seq,
                header.len,
                packet.len()
            );
        }
        let payload = packet.get(HEADER_LEN..end).unwrap_or(&[]);

        match kind {
            PacketKind::Trace => self.decode_trace_packet(payload, sender, &range, &mut report)?,
            PacketKind::Dictionary => {
                self.decode_dict_packet(payload, sender, &range, &mut report)?
            }
            PacketKind::User => self.decode_user_packet(payload, sender, &range, &mut report)?,
            PacketKind::Unknown(_) => {}
        }
        Ok(report)
    }

    fn require_session(&self, sender: Option<SenderId>) -> Result<DictIdRange> {
        self.state
            .range_for(sender)
            .ok_or(DecodeError::Uninitialized)
    }

    fn decode_trace_packet(
        &mut self,
        payload: &[u8],
        sender: Option<SenderId>,
        range: &DictIdRange,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let complete = payload.len() / ENTRY_LEN * ENTRY_LEN;
        if complete < payload.len() {
            log::debug!(
                "Dropping {} trailing bytes of a partial trace entry",
                payload.len() - complete
            );
            self.stats.truncated_subrecords += 1;
            report.skipped += 1;
        }
        let payload = &payload[..complete];
        if payload.is_empty() {
            return Ok(());
        }

        let Some(first) = TraceEntry::from_slice(&payload[..ENTRY_LEN])
            .filter(|entry| entry.tag() == TAG_WINDOW)
        else {
            log::warn!("Discarding trace packet that does not open with a window mark");
            self.stats.malformed_packets += 1;
            report.outcome = PacketOutcome::Discarded(DiscardReason::MissingWindow);
            return Ok(());
        };

        let mut begin_time = WindowMark::decode(&first).begin_time;
        let mut offset = ENTRY_LEN;

        while offset < payload.len() {
            let calc = match prepare_timestamp(payload, offset, begin_time) {
                Some(calc) => calc,
                None => {
                    // No closing mark: the remaining entries share the window's begin time
                    log::debug!(
                        "Trace window starting at {begin_time} is not closed; {} entries left",
                        (payload.len() - offset) / ENTRY_LEN
                    );
                    self.stats.unterminated_windows += 1;
                    CalcTime {
                        time_per_trace: 0.0,
                        beg_time_next_window: begin_time,
                        end_offset: payload.len(),
                    }
                }
            };

            for (index, chunk) in payload[offset..calc.end_offset]
                .chunks_exact(ENTRY_LEN)
                .enumerate()
            {
                let Some(entry) = TraceEntry::from_slice(chunk) else {
                    continue;
                };
                let timestamp = calc.timestamp(begin_time, index);

                if self.past_stop_bound(timestamp) {
                    report.outcome = PacketOutcome::ReachedStopBound;
                    return Ok(());
                }

                match decode_entry(&entry, timestamp, range) {
                    Ok(record) => {
                        self.stats.trace_decoded(record.kind());
                        self.sink.add_trace(sender, record)?;
                        report.forwarded += 1;
                    }
                    Err(skip) => {
                        log::debug!("Skipping trace entry at offset {offset}+{index}: {skip:?}");
                        self.stats.subrecord_skipped(skip);
                        report.skipped += 1;
                    }
                }
            }

            begin_time = calc.beg_time_next_window;
            offset = calc.end_offset + ENTRY_LEN;
        }
        Ok(())
    }

    /// Sets the stop flag the first time a trace lands past the replay bound
    fn past_stop_bound(&mut self, timestamp: i64) -> bool {
        let DecoderMode::Historical {
            up_to_time: Some(bound),
        } = self.mode
        else {
            return false;
        };
        if timestamp <= bound {
            return false;
        }
        log::info!("Trace timestamp {timestamp} is past {bound}; stopping");
        self.state.request_stop();
        true
    }

    fn read_dict_id(
        &mut self,
        reader: &mut PayloadReader<'_>,
        range: &DictIdRange,
        report: &mut DecodeReport,
    ) -> Option<DictId> {
        let dict_id = match reader.read_u32("dict_id") {
            Ok(id) => id,
            Err(e) => {
                log::warn!(
                    "Discarding packet: {} needs {} bytes, {} available",
                    e.field,
                    e.needed,
                    e.available
                );
                self.stats.malformed_packets += 1;
                report.outcome = PacketOutcome::Discarded(DiscardReason::MissingDictId);
                return None;
            }
        };

        if !range.contains(dict_id) {
            log::debug!(
                "Dictionary id {dict_id} outside {}..={}",
                range.min(),
                range.max()
            );
            self.stats.out_of_range_ids += 1;
            report.skipped += 1;
            report.outcome = PacketOutcome::Discarded(DiscardReason::DictIdOutOfRange(dict_id));
            return None;
        }
        Some(dict_id)
    }

    fn decode_dict_packet(
        &mut self,
        payload: &[u8],
        sender: Option<SenderId>,
        range: &DictIdRange,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let mut reader = PayloadReader::new(payload);
        let Some(dict_id) = self.read_dict_id(&mut reader, range, report) else {
            return Ok(());
        };

        let entry = DictEntry::from_text(dict_id, &reader.read_text());
        log::trace!("Dictionary {dict_id} -> {}", entry.path);
        self.sink.add_dict_entry(sender, entry)?;
        self.stats.dictionary_entries += 1;
        report.forwarded += 1;
        Ok(())
    }

    fn decode_user_packet(
        &mut self,
        payload: &[u8],
        sender: Option<SenderId>,
        range: &DictIdRange,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let mut reader = PayloadReader::new(payload);
        let Some(dict_id) = self.read_dict_id(&mut reader, range, report) else {
            return Ok(());
        };

        let entry = UserEntry::from_text(dict_id, &reader.read_text());
        log::trace!("User {dict_id} -> {}@{}", entry.identity.user, entry.identity.host);
        self.sink.add_user_entry(sender, entry)?;
        self.stats.user_entries += 1;
        report.forwarded += 1;
        Ok(())
    }

    /// Return to the uninitialised state, forgetting every sender.
    ///
    /// Only session state is cleared. Entries already handed to the sink stay
    /// there until the sink flushes or is reset by its owner.
    pub fn reset(&mut self) {
        self.state.reset();
        self.sequences.reset();
        self.stats.reset();
    }

    pub fn last_seq(&self) -> Option<u8> {
        self.sink.last_seq()
    }

    /// True once the driving loop should stop feeding packets
    pub fn stop_now(&self) -> bool {
        self.state.stop_requested()
    }

    /// Handle the driving loop can keep to request or observe a stop
    pub fn stop_token(&self) -> StopToken {
        self.state.stop_token()
    }

    pub fn phase(&self) -> DecoderPhase {
        self.state.phase()
    }

    pub fn mode(&self) -> DecoderMode {
        self.mode
    }

    pub fn host_port(&self, sender: Option<SenderId>) -> Option<&str> {
        self.state.host_port(sender)
    }

    pub fn statistics(&self) -> &DecoderStatistics {
        &self.stats
    }

    pub fn sequences(&self) -> &SequenceTracker {
        &self.sequences
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn flush_history_data(&mut self) -> Result<()> {
        Ok(self.sink.flush_history_data()?)
    }

    pub fn flush_real_time_data(&mut self) -> Result<()> {
        Ok(self.sink.flush_real_time_data()?)
    }
}
