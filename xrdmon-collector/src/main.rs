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

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use xrdmon_collector::cli_args::{Mode, Opt};
use xrdmon_collector::config::CollectorConfig;
use xrdmon_collector::listener::run_listener;
use xrdmon_collector::replay::run_replay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // try_init also routes the decoder's `log` records into tracing
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish()
        .try_init()?;

    let opt = Opt::parse();
    let config = match &opt.config {
        Some(path) => CollectorConfig::from_file(path)?,
        None => CollectorConfig::from_env_or_default()?,
    };

    match opt.mode {
        Mode::Listen(listen) => run_listener(&config, listen.bind).await?,
        Mode::Replay(replay) => {
            let summary = tokio::task::spawn_blocking(move || run_replay(&config, &replay)).await??;
            if summary.trailing_bytes > 0 {
                tracing::warn!(
                    "{} bytes at the end of the capture were not decoded",
                    summary.trailing_bytes
                );
            }
        }
    };

    Ok(())
}
