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

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

/// Collect or replay xrootd monitoring streams.
#[derive(Parser, Debug)]
#[clap(name = "xrdmon-collector")]
pub struct Opt {
    /// YAML configuration file. Falls back to `XRDMON_CONFIG`, then to
    /// `XRDMON_*` environment variables.
    #[clap(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Receive monitoring packets over UDP and log them as they arrive.
    Listen(Listen),

    /// Decode a capture of raw packets, optionally stopping at a point in time.
    Replay(Replay),
}

#[derive(Args, Debug, Clone)]
pub struct Listen {
    /// Address to receive monitoring packets on.
    #[clap(long = "bind", default_value = "0.0.0.0:9930")]
    pub bind: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct Replay {
    /// Capture file: raw packets back to back, each sized by its header.
    #[clap(long = "input", short = 'i')]
    pub input: PathBuf,

    /// Stop at the first trace later than this time.
    ///
    /// Accepts RFC 3339 (2024-05-01T12:00:00Z) or unix seconds.
    #[arg(long = "up-to", value_parser = parse_up_to)]
    pub up_to: Option<i64>,

    /// Write trace records to the trace log as well.
    #[clap(long = "save-traces")]
    pub save_traces: bool,

    /// Server the capture was taken from.
    #[clap(long = "sender", default_value = "unknown:0")]
    pub sender: String,
}

#[derive(Error, Debug)]
pub enum ParseTimeError {
    #[error("Invalid time {0:?}: expected RFC 3339 or unix seconds")]
    InvalidTime(String),
}

pub fn parse_up_to(s: &str) -> Result<i64, ParseTimeError> {
    if let Ok(seconds) = s.parse::<i64>() {
        return Ok(seconds);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|time| time.timestamp())
        .map_err(|_| ParseTimeError::InvalidTime(s.to_string()))
}
