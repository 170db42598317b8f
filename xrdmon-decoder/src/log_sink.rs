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

//! File-backed sink writing one JSON object per line.
//!
//! Layout under `base_dir`:
//!
//! ```text
//! dict.jsonl            dictionary entries, appended on history flush
//! user.jsonl            user entries, appended on history flush
//! sequence.json         last sequence number recorded at history flush
//! traces-NNNN.jsonl     trace records (historical mode with save_traces)
//! <rt_log_dir>/realtime.jsonl   every entry, appended on real-time flush
//! ```

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::record::{DictEntry, TraceRecord, UserEntry};
use crate::sequence::SenderId;
use crate::sink::Sink;

pub const DICT_FILE: &str = "dict.jsonl";
pub const USER_FILE: &str = "user.jsonl";
pub const SEQUENCE_FILE: &str = "sequence.json";
pub const REALTIME_FILE: &str = "realtime.jsonl";

/// How a [`LogSink`] persists what it receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSinkMode {
    /// Live collection; everything is mirrored to `rt_log_dir`
    RealTime { rt_log_dir: PathBuf },
    /// Replay of recorded traffic
    History {
        save_traces: bool,
        /// Rotate the trace file once it reaches this many bytes (0 = never)
        max_trace_log_size: u64,
    },
}

#[derive(Serialize)]
struct LogLine<'a, T: Serialize> {
    record: &'static str,
    sender: Option<SenderId>,
    #[serde(flatten)]
    entry: &'a T,
}

#[derive(Debug, Serialize, Deserialize)]
struct SequenceState {
    last_seq: u8,
}

/// Trace file that rolls over to a new index when full
#[derive(Debug)]
struct TraceLog {
    dir: PathBuf,
    index: u32,
    max_size: u64,
    written: u64,
    writer: Option<BufWriter<File>>,
}

impl TraceLog {
    fn new(dir: &Path, max_size: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            index: 0,
            max_size,
            written: 0,
            writer: None,
        }
    }

    fn path_for(dir: &Path, index: u32) -> PathBuf {
        dir.join(format!("traces-{index:04}.jsonl"))
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        if self.max_size > 0 && self.written >= self.max_size {
            self.rotate()?;
        }

        if self.writer.is_none() {
            let path = Self::path_for(&self.dir, self.index);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.written = file.metadata()?.len();
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            self.written += line.len() as u64 + 1;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.writer = None;
        self.index += 1;
        self.written = 0;
        log::info!(
            "Rotating trace log to {}",
            Self::path_for(&self.dir, self.index).display()
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Sink that persists decoded entries as JSON lines
#[derive(Debug)]
pub struct LogSink {
    base_dir: PathBuf,
    mode: LogSinkMode,
    pending_dict: Vec<String>,
    pending_users: Vec<String>,
    pending_real_time: Vec<String>,
    traces: Option<TraceLog>,
    pending_seq: Option<u8>,
    durable_seq: Option<u8>,
}

impl LogSink {
    /// Create the sink, its directories, and pick up the sequence number
    /// recorded by a previous run in the same `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, mode: LogSinkMode) -> Result<Self, SinkError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;

        let traces = match &mode {
            LogSinkMode::RealTime { rt_log_dir } => {
                fs::create_dir_all(rt_log_dir)?;
                None
            }
            LogSinkMode::History {
                save_traces: true,
                max_trace_log_size,
            } => Some(TraceLog::new(&base_dir, *max_trace_log_size)),
            LogSinkMode::History { .. } => None,
        };

        let durable_seq = Self::read_sequence(&base_dir)?;
        if let Some(seq) = durable_seq {
            log::info!("Resuming after sequence {seq} from {}", base_dir.display());
        }

        Ok(Self {
            base_dir,
            mode,
            pending_dict: Vec::new(),
            pending_users: Vec::new(),
            pending_real_time: Vec::new(),
            traces,
            pending_seq: None,
            durable_seq,
        })
    }

    pub fn real_time(
        base_dir: impl Into<PathBuf>,
        rt_log_dir: impl Into<PathBuf>,
    ) -> Result<Self, SinkError> {
        Self::new(
            base_dir,
            LogSinkMode::RealTime {
                rt_log_dir: rt_log_dir.into(),
            },
        )
    }

    pub fn history(
        base_dir: impl Into<PathBuf>,
        save_traces: bool,
        max_trace_log_size: u64,
    ) -> Result<Self, SinkError> {
        Self::new(
            base_dir,
            LogSinkMode::History {
                save_traces,
                max_trace_log_size,
            },
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn mode(&self) -> &LogSinkMode {
        &self.mode
    }

    fn is_real_time(&self) -> bool {
        matches!(self.mode, LogSinkMode::RealTime { .. })
    }

    fn line<T: Serialize>(
        record: &'static str,
        sender: Option<SenderId>,
        entry: &T,
    ) -> Result<String, SinkError> {
        Ok(serde_json::to_string(&LogLine {
            record,
            sender,
            entry,
        })?)
    }

    fn read_sequence(base_dir: &Path) -> Result<Option<u8>, SinkError> {
        let path = base_dir.join(SEQUENCE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<SequenceState>(&content) {
            Ok(state) => Ok(Some(state.last_seq)),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    fn append_lines(path: &Path, lines: &mut Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for line in lines.iter() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        log::debug!("Appended {} lines to {}", lines.len(), path.display());
        lines.clear();
        Ok(())
    }
}

impl Sink for LogSink {
    fn add_dict_entry(
        &mut self,
        sender: Option<SenderId>,
        entry: DictEntry,
    ) -> Result<(), SinkError> {
        let line = Self::line("dictionary", sender, &entry)?;
        if self.is_real_time() {
            self.pending_real_time.push(line.clone());
        }
        self.pending_dict.push(line);
        Ok(())
    }

    fn add_user_entry(
        &mut self,
        sender: Option<SenderId>,
        entry: UserEntry,
    ) -> Result<(), SinkError> {
        let line = Self::line("user", sender, &entry)?;
        if self.is_real_time() {
            self.pending_real_time.push(line.clone());
        }
        self.pending_users.push(line);
        Ok(())
    }

    fn add_trace(
        &mut self,
        sender: Option<SenderId>,
        record: TraceRecord,
    ) -> Result<(), SinkError> {
        if self.is_real_time() {
            let line = Self::line("trace", sender, &record)?;
            self.pending_real_time.push(line);
        } else if let Some(traces) = self.traces.as_mut() {
            let line = Self::line("trace", sender, &record)?;
            traces.write_line(&line)?;
        }
        Ok(())
    }

    fn set_last_seq(&mut self, _sender: Option<SenderId>, seq: u8) {
        self.pending_seq = Some(seq);
    }

    fn last_seq(&self) -> Option<u8> {
        self.durable_seq
    }

    fn flush_history_data(&mut self) -> Result<(), SinkError> {
        Self::append_lines(&self.base_dir.join(DICT_FILE), &mut self.pending_dict)?;
        Self::append_lines(&self.base_dir.join(USER_FILE), &mut self.pending_users)?;
        if let Some(traces) = self.traces.as_mut() {
            traces.flush()?;
        }

        if let Some(seq) = self.pending_seq {
            let state = serde_json::to_string(&SequenceState { last_seq: seq })?;
            fs::write(self.base_dir.join(SEQUENCE_FILE), state)?;
            self.durable_seq = Some(seq);
        }
        Ok(())
    }

    fn flush_real_time_data(&mut self) -> Result<(), SinkError> {
        if let LogSinkMode::RealTime { rt_log_dir } = &self.mode {
            let path = rt_log_dir.join(REALTIME_FILE);
            Self::append_lines(&path, &mut self.pending_real_time)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending_dict.clear();
        self.pending_users.clear();
        self.pending_real_time.clear();
        self.pending_seq = None;
        if let Some(traces) = self.traces.as_mut() {
            if let Err(e) = traces.flush() {
                log::warn!("Failed to flush trace log on reset: {e}");
            }
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Some(traces) = self.traces.as_mut() {
            if let Err(e) = traces.flush() {
                log::warn!("Failed to flush trace log: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CloseRecord, ReadWriteRecord};

    fn read_record(dict_id: u32) -> TraceRecord {
        TraceRecord::ReadWrite(ReadWriteRecord {
            dict_id,
            timestamp: 1_700_000_000,
            offset: 0,
            length: 1024,
        })
    }

    #[test]
    fn test_history_flush_writes_dictionary_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LogSink::history(dir.path(), false, 0).unwrap();

        sink.add_dict_entry(None, DictEntry::from_text(1, "u.1:2@h\n/a/b"))
            .unwrap();
        sink.set_last_seq(None, 41);
        assert_eq!(sink.last_seq(), None);

        sink.flush_history_data().unwrap();
        assert_eq!(sink.last_seq(), Some(41));

        let dict = fs::read_to_string(dir.path().join(DICT_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(dict.trim()).unwrap();
        assert_eq!(value["record"], "dictionary");
        assert_eq!(value["path"], "/a/b");
        assert_eq!(value["dict_id"], 1);
    }

    #[test]
    fn test_sequence_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = LogSink::history(dir.path(), false, 0).unwrap();
            sink.set_last_seq(None, 200);
            sink.flush_history_data().unwrap();
        }
        let sink = LogSink::history(dir.path(), false, 0).unwrap();
        assert_eq!(sink.last_seq(), Some(200));
    }

    #[test]
    fn test_traces_skipped_unless_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LogSink::history(dir.path(), false, 0).unwrap();
        sink.add_trace(None, read_record(1)).unwrap();
        sink.flush_history_data().unwrap();
        assert!(!TraceLog::path_for(dir.path(), 0).exists());
    }

    #[test]
    fn test_trace_log_rotates_at_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LogSink::history(dir.path(), true, 64).unwrap();
        for dict_id in 0..6 {
            sink.add_trace(None, read_record(dict_id)).unwrap();
        }
        sink.flush_history_data().unwrap();

        assert!(TraceLog::path_for(dir.path(), 0).exists());
        assert!(TraceLog::path_for(dir.path(), 1).exists());

        let total_lines: usize = (0..6)
            .map(|i| TraceLog::path_for(dir.path(), i))
            .filter(|p| p.exists())
            .map(|p| fs::read_to_string(p).unwrap().lines().count())
            .sum();
        assert_eq!(total_lines, 6);
    }

    #[test]
    fn test_real_time_flush_mirrors_everything() {
        let dir = tempfile::tempdir().unwrap();
        let rt_dir = dir.path().join("rt");
        let mut sink = LogSink::real_time(dir.path(), &rt_dir).unwrap();
        let sender = SenderId::new(2);

        sink.add_user_entry(sender, UserEntry::from_text(5, "a.1:1@h"))
            .unwrap();
        sink.add_trace(
            sender,
            TraceRecord::Close(CloseRecord {
                dict_id: 5,
                timestamp: 10,
                bytes_read: 1,
                bytes_written: 2,
            }),
        )
        .unwrap();
        sink.flush_real_time_data().unwrap();

        let content = fs::read_to_string(rt_dir.join(REALTIME_FILE)).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"], "user");
        assert_eq!(lines[1]["record"], "trace");
        assert_eq!(lines[1]["kind"], "close");
        assert_eq!(lines[1]["sender"], 2);

        // User entries still wait for the history flush
        assert!(!dir.path().join(USER_FILE).exists());
        sink.flush_history_data().unwrap();
        assert!(dir.path().join(USER_FILE).exists());
    }

    #[test]
    fn test_reset_drops_pending_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LogSink::history(dir.path(), false, 0).unwrap();
        sink.add_dict_entry(None, DictEntry::from_text(1, "/x")).unwrap();
        sink.reset();
        sink.flush_history_data().unwrap();
        assert!(!dir.path().join(DICT_FILE).exists());
    }
}
