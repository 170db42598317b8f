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

//! Timestamp reconstruction for trace packets.
//!
//! Trace packets do not carry a time per event. They carry window marks: the
//! payload opens with one, and every later mark closes the running window and
//! opens the next. Events between two marks get evenly spaced timestamps
//! across the window, so downstream consumers must treat trace times as
//! approximate within one window.

use serde::{Deserialize, Serialize};

use crate::subrecord::{TraceEntry, ENTRY_LEN, TAG_WINDOW};

/// Boundaries of one trace window, in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub begin_time: i64,
    pub end_time: i64,
}

impl TimeWindow {
    pub fn new(begin_time: i64, end_time: i64) -> Self {
        Self {
            begin_time,
            end_time,
        }
    }

    /// Seconds allotted to each of `records` events.
    ///
    /// A window with zero records behaves as a window with one. A window whose
    /// end precedes its begin (server clock stepped back) has zero width.
    pub fn time_per_trace(&self, records: usize) -> f32 {
        let span = (self.end_time - self.begin_time).max(0);
        span as f32 / records.max(1) as f32
    }

    /// Interpolated timestamps for `records` events in this window
    pub fn timestamps(&self, records: usize) -> impl Iterator<Item = i64> + '_ {
        let per_trace = self.time_per_trace(records);
        (0..records).map(move |index| interpolate(self.begin_time, per_trace, index))
    }
}

/// Interpolation parameters for the events up to the next window mark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalcTime {
    pub time_per_trace: f32,
    /// Begin time announced by the closing mark for the window after it
    pub beg_time_next_window: i64,
    /// Payload offset of the closing window mark
    pub end_offset: usize,
}

impl CalcTime {
    pub fn timestamp(&self, begin_time: i64, index: usize) -> i64 {
        interpolate(begin_time, self.time_per_trace, index)
    }
}

fn interpolate(begin_time: i64, per_trace: f32, index: usize) -> i64 {
    begin_time + (index as f32 * per_trace) as i64
}

/// Times carried by a window mark entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMark {
    /// End of the window this mark closes
    pub end_time: i64,
    /// Begin of the window this mark opens
    pub begin_time: i64,
}

impl WindowMark {
    pub fn decode(entry: &TraceEntry) -> Self {
        Self {
            end_time: i64::from(entry.arg1()),
            begin_time: i64::from(entry.arg2()),
        }
    }
}

/// Locate the window mark closing the window that starts at `offset` and
/// derive the interpolation parameters for the entries before it.
///
/// Returns `None` if the payload ends before a closing mark.
pub fn prepare_timestamp(payload: &[u8], offset: usize, begin_time: i64) -> Option<CalcTime> {
    let mut cursor = offset;
    let mut records = 0usize;

    while cursor + ENTRY_LEN <= payload.len() {
        if payload[cursor] == TAG_WINDOW {
            let entry = TraceEntry::from_slice(&payload[cursor..cursor + ENTRY_LEN])?;
            let mark = WindowMark::decode(&entry);
            let window = TimeWindow::new(begin_time, mark.end_time);
            return Some(CalcTime {
                time_per_trace: window.time_per_trace(records),
                beg_time_next_window: mark.begin_time,
                end_offset: cursor,
            });
        }
        cursor += ENTRY_LEN;
        records += 1;
    }

    None
}
