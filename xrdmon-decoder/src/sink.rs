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

use crate::error::SinkError;
use crate::record::{DictEntry, TraceRecord, UserEntry};
use crate::sequence::SenderId;

/// Destination for decoded entries.
///
/// Calls are synchronous. Buffering, I/O and rotation are the sink's own
/// business; the decoder only decides what to hand over and when the caller
/// asked for a flush.
pub trait Sink {
    fn add_dict_entry(&mut self, sender: Option<SenderId>, entry: DictEntry)
        -> Result<(), SinkError>;

    fn add_user_entry(&mut self, sender: Option<SenderId>, entry: UserEntry)
        -> Result<(), SinkError>;

    fn add_trace(&mut self, sender: Option<SenderId>, record: TraceRecord)
        -> Result<(), SinkError>;

    /// Record the sequence number of the packet being decoded
    fn set_last_seq(&mut self, sender: Option<SenderId>, seq: u8);

    /// Last sequence number the sink has durably recorded
    fn last_seq(&self) -> Option<u8>;

    fn flush_history_data(&mut self) -> Result<(), SinkError>;

    fn flush_real_time_data(&mut self) -> Result<(), SinkError>;

    /// Drop anything buffered for the current session
    fn reset(&mut self) {}
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub dictionary: Vec<(Option<SenderId>, DictEntry)>,
    pub users: Vec<(Option<SenderId>, UserEntry)>,
    pub traces: Vec<(Option<SenderId>, TraceRecord)>,
    pub history_flushes: usize,
    pub real_time_flushes: usize,
    last_seq: Option<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace_records(&self) -> impl Iterator<Item = &TraceRecord> {
        self.traces.iter().map(|(_, record)| record)
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.trace_records().map(TraceRecord::timestamp).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty() && self.users.is_empty() && self.traces.is_empty()
    }
}

impl Sink for MemorySink {
    fn add_dict_entry(
        &mut self,
        sender: Option<SenderId>,
        entry: DictEntry,
    ) -> Result<(), SinkError> {
        self.dictionary.push((sender, entry));
        Ok(())
    }

    fn add_user_entry(
        &mut self,
        sender: Option<SenderId>,
        entry: UserEntry,
    ) -> Result<(), SinkError> {
        self.users.push((sender, entry));
        Ok(())
    }

    fn add_trace(
        &mut self,
        sender: Option<SenderId>,
        record: TraceRecord,
    ) -> Result<(), SinkError> {
        self.traces.push((sender, record));
        Ok(())
    }

    fn set_last_seq(&mut self, _sender: Option<SenderId>, seq: u8) {
        self.last_seq = Some(seq);
    }

    fn last_seq(&self) -> Option<u8> {
        self.last_seq
    }

    fn flush_history_data(&mut self) -> Result<(), SinkError> {
        self.history_flushes += 1;
        Ok(())
    }

    fn flush_real_time_data(&mut self) -> Result<(), SinkError> {
        self.real_time_flushes += 1;
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
