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
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "XRDMON_CONFIG";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Directory for dictionary, user, sequence and trace logs
    pub base_dir: PathBuf,
    /// Directory for the real-time mirror log
    pub rt_log_dir: PathBuf,
    pub dict_id_min: u32,
    pub dict_id_max: u32,
    pub flush_interval_ms: u64,
    /// How often the listener persists dictionary, user and sequence data
    pub history_flush_interval_ms: u64,
    pub save_traces: bool,
    /// Trace log rotation size in bytes, 0 disables rotation
    pub max_trace_log_size: u64,
    pub recv_buffer_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("xrdmon-data"),
            rt_log_dir: PathBuf::from("xrdmon-data/realtime"),
            dict_id_min: 0,
            dict_id_max: u32::MAX,
            flush_interval_ms: 1000,
            history_flush_interval_ms: 60_000,
            save_traces: false,
            max_trace_log_size: 64 * 1024 * 1024,
            recv_buffer_size: 65536,
        }
    }
}

impl CollectorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: CollectorConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_default() -> anyhow::Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(&config_path);
        }

        let defaults = Self::default();
        let config = CollectorConfig {
            base_dir: std::env::var("XRDMON_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            rt_log_dir: std::env::var("XRDMON_RT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.rt_log_dir),
            dict_id_min: env_or("XRDMON_DICT_ID_MIN", defaults.dict_id_min),
            dict_id_max: env_or("XRDMON_DICT_ID_MAX", defaults.dict_id_max),
            flush_interval_ms: env_or("XRDMON_FLUSH_INTERVAL_MS", defaults.flush_interval_ms),
            history_flush_interval_ms: env_or(
                "XRDMON_HISTORY_FLUSH_INTERVAL_MS",
                defaults.history_flush_interval_ms,
            ),
            save_traces: env_or("XRDMON_SAVE_TRACES", defaults.save_traces),
            max_trace_log_size: env_or("XRDMON_MAX_TRACE_LOG_SIZE", defaults.max_trace_log_size),
            recv_buffer_size: env_or("XRDMON_RECV_BUFFER_SIZE", defaults.recv_buffer_size),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dict_id_min > self.dict_id_max {
            anyhow::bail!(
                "dict_id_min ({}) must not exceed dict_id_max ({})",
                self.dict_id_min,
                self.dict_id_max
            );
        }
        if self.flush_interval_ms == 0 || self.history_flush_interval_ms == 0 {
            anyhow::bail!("flush intervals must be positive");
        }
        if self.recv_buffer_size < xrdmon_decoder::HEADER_LEN {
            anyhow::bail!("recv_buffer_size is smaller than a packet header");
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
