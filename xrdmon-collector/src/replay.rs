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

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use xrdmon_decoder::{DecoderStatistics, PacketDecoder, SenderId, Sink};

use crate::capture::CaptureSplitter;
use crate::cli_args::Replay;
use crate::config::CollectorConfig;

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub packets: usize,
    /// The decoder reached its time bound before the capture ended
    pub stopped_early: bool,
    /// Bytes at the end of the capture that did not form a packet
    pub trailing_bytes: usize,
    pub statistics: DecoderStatistics,
}

/// Feed every packet of `capture` to `decoder` until it asks to stop, then
/// flush history data.
pub fn replay_capture<S: Sink>(
    decoder: &mut PacketDecoder<S>,
    capture: &[u8],
    sender: Option<SenderId>,
) -> anyhow::Result<ReplaySummary> {
    let mut splitter = CaptureSplitter::new(capture);
    let mut packets = 0;
    let mut trailing_bytes = 0;

    while !decoder.stop_now() {
        let Some(next) = splitter.next() else {
            break;
        };
        let packet = match next {
            Ok(packet) => packet,
            Err(e) => {
                warn!("{e}");
                trailing_bytes = capture.len() - splitter.position();
                break;
            }
        };
        let report = decoder
            .decode_raw(packet, sender)
            .with_context(|| format!("Failed to decode packet {packets}"))?;
        debug!(
            "packet {packets}: {:?} forwarded={} skipped={}",
            report.outcome, report.forwarded, report.skipped
        );
        packets += 1;
    }

    decoder
        .flush_history_data()
        .context("Failed to flush history data")?;

    Ok(ReplaySummary {
        packets,
        stopped_early: decoder.stop_now(),
        trailing_bytes,
        statistics: decoder.statistics().clone(),
    })
}

pub fn run_replay(config: &CollectorConfig, args: &Replay) -> anyhow::Result<ReplaySummary> {
    let capture = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read capture {}", args.input.display()))?;
    let save_traces = args.save_traces || config.save_traces;

    if let Some(bound) = args.up_to {
        match DateTime::<Utc>::from_timestamp(bound, 0) {
            Some(time) => info!("Replaying up to {}", time.to_rfc3339()),
            None => info!("Replaying up to unix time {bound}"),
        }
    }

    let mut decoder = PacketDecoder::historical(
        &config.base_dir,
        save_traces,
        config.max_trace_log_size,
        args.up_to,
    )
    .with_context(|| format!("Failed to open log directory {}", config.base_dir.display()))?;
    decoder.init(config.dict_id_min, config.dict_id_max, &args.sender)?;

    info!(
        "Replaying {} ({} bytes) from {}",
        args.input.display(),
        capture.len(),
        args.sender
    );
    let summary = replay_capture(&mut decoder, &capture, None)?;
    info!(
        "Replay finished: {} packets, {} trace records, {} lost{}",
        summary.packets,
        summary.statistics.trace_records(),
        summary.statistics.lost_packets,
        if summary.stopped_early {
            ", stopped at time bound"
        } else {
            ""
        }
    );
    Ok(summary)
}
