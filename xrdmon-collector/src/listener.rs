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

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use xrdmon_decoder::{PacketDecoder, Sink};

use crate::config::CollectorConfig;
use crate::senders::{Registration, SenderRegistry};

/// Receive packets on `socket` and decode them until `shutdown` resolves or
/// the decoder's stop token is cancelled.
///
/// Real-time data is flushed every `flush_interval_ms` and history data every
/// `history_flush_interval_ms`, both once more on the way out. The decoder is
/// handed back so callers can inspect it.
pub async fn serve<S, F>(
    socket: UdpSocket,
    mut decoder: PacketDecoder<S>,
    config: &CollectorConfig,
    shutdown: F,
) -> anyhow::Result<PacketDecoder<S>>
where
    S: Sink,
    F: Future<Output = ()>,
{
    let mut senders = SenderRegistry::new();
    let mut buf = vec![0u8; config.recv_buffer_size];
    let mut flush = tokio::time::interval(Duration::from_millis(config.flush_interval_ms));
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut history_flush =
        tokio::time::interval(Duration::from_millis(config.history_flush_interval_ms));
    history_flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let stop = decoder.stop_token();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = flush.tick() => {
                decoder
                    .flush_real_time_data()
                    .context("Failed to flush real-time data")?;
                if stop.is_cancelled() {
                    info!("Decoder stopped");
                    break;
                }
            }
            _ = history_flush.tick() => {
                decoder
                    .flush_history_data()
                    .context("Failed to flush history data")?;
            }
            received = socket.recv_from(&mut buf) => {
                let Some((len, peer)) = accept_datagram(received) else {
                    continue;
                };
                let registration = senders.resolve(peer);
                if let Registration::New(id) = registration {
                    decoder.init_sender(
                        id,
                        config.dict_id_min,
                        config.dict_id_max,
                        &peer.to_string(),
                    )?;
                }
                let report = decoder
                    .decode_raw(&buf[..len], registration.sender())
                    .with_context(|| format!("Failed to decode packet from {peer}"))?;
                if report.lost() > 0 {
                    debug!("{peer}: {} packets lost before this one", report.lost());
                }
            }
        }
    }

    decoder
        .flush_real_time_data()
        .context("Failed to flush real-time data")?;
    decoder
        .flush_history_data()
        .context("Failed to flush history data")?;
    info!(
        "Served {} senders; {} packets, {} lost",
        senders.len(),
        decoder.statistics().packets_received,
        decoder.statistics().lost_packets
    );
    Ok(decoder)
}

/// A failed receive loses one datagram, not the listener
fn accept_datagram(received: io::Result<(usize, SocketAddr)>) -> Option<(usize, SocketAddr)> {
    match received {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            warn!("Failed to receive packet: {e}");
            None
        }
    }
}

pub async fn run_listener(config: &CollectorConfig, bind: SocketAddr) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let local = socket.local_addr()?;

    let mut decoder = PacketDecoder::real_time(&config.base_dir, &config.rt_log_dir)
        .with_context(|| format!("Failed to open log directory {}", config.base_dir.display()))?;
    decoder.init(config.dict_id_min, config.dict_id_max, &local.to_string())?;

    info!(
        "Listening for monitoring packets on {local} since {}",
        Utc::now().to_rfc3339()
    );
    serve(socket, decoder, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await?;
    info!("Listener on {local} stopped at {}", Utc::now().to_rfc3339());
    Ok(())
}
