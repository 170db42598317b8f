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

//! Decoder for xrootd monitoring packets.
//!
//! Servers stream small UDP datagrams describing file activity. Each packet
//! has an 8-byte header (type code, wrapping sequence number, length, server
//! start time) followed by a payload:
//!
//! - **dictionary** (`d`): binds a dictionary id to a file path
//! - **user** (`u`): binds a dictionary id to a client identity
//! - **trace** (`t`): fixed-size sub-records (read/write, open, close,
//!   disconnect) grouped into time windows
//!
//! [`PacketDecoder`] checks sequence continuity per sender, reconstructs
//! per-event timestamps from the window marks and hands every decoded entry
//! to a [`Sink`].
//!
//! ```no_run
//! use xrdmon_decoder::{DecoderMode, MemorySink, PacketDecoder};
//!
//! let mut decoder = PacketDecoder::with_sink(MemorySink::new(), DecoderMode::RealTime);
//! decoder.init(1, 100_000, "data01.example.org:1094")?;
//! # let datagram: Vec<u8> = Vec::new();
//! let report = decoder.decode_raw(&datagram, None)?;
//! println!("{} entries, {} lost", report.forwarded, report.lost());
//! # Ok::<(), xrdmon_decoder::DecodeError>(())
//! ```

// ── Wire format ───────────────────────────────────────────────────────────────

pub mod header;
pub mod reader;
pub mod subrecord;
pub mod window;

// ── Decoding ──────────────────────────────────────────────────────────────────

pub mod decoder;
pub mod record;
pub mod sequence;
pub mod state;
pub mod statistics;

// ── Output ────────────────────────────────────────────────────────────────────

pub mod log_sink;
pub mod sink;

pub mod builder;
pub mod error;

pub use decoder::{DecodeReport, DecoderMode, DiscardReason, PacketDecoder, PacketOutcome};
pub use error::{DecodeError, HeaderError, Result, SinkError};
pub use header::{PacketHeader, PacketKind, HEADER_LEN};
pub use log_sink::{LogSink, LogSinkMode};
pub use record::{DictEntry, DictId, TraceKind, TraceRecord, UserEntry, UserIdentity};
pub use sequence::{LossEvent, SenderId, SequenceCheck, SequenceTracker};
pub use sink::{MemorySink, Sink};
pub use state::{DecoderPhase, DictIdRange, StopToken};
pub use statistics::DecoderStatistics;
pub use window::{CalcTime, TimeWindow};
