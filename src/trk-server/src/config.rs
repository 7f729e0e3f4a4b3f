// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for trk-server.
//!
//! Config is loaded from the `[trk-server]` section of `trk-rs.toml`
//! (see `trk_app::ConfigFile` for the search order).

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use trk_app::ConfigFile;
use trk_core::SamplingConfig;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// TCP listener configuration
    pub listen: ListenConfig,
    /// Downstream ingest endpoint
    pub sink: SinkConfig,
    /// Device allow-list
    pub devices: DevicesConfig,
    /// Sampling thresholds
    pub sampling: SamplingSection,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Close a connection after this many seconds without bytes
    pub idle_timeout_secs: u64,
    /// Also acknowledge position frames (some firmwares require it)
    pub ack_position_frames: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5023,
            idle_timeout_secs: 180,
            ack_position_frames: false,
        }
    }
}

/// Downstream ingest endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Ingest URL accepting the POSTed fix JSON
    pub url: String,
    /// Optional bearer token sent with every request
    pub api_key: Option<String>,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Total delivery attempts per fix
    pub retry_attempts: u32,
    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/api/v1/tracker/data".to_string(),
            api_key: None,
            timeout_secs: 5,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Device allow-list. Empty means every device may log in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Allowed device ids (lowercase hex of the terminal-id field)
    pub allowed: Vec<String>,
}

impl DevicesConfig {
    /// Allow-list as a lookup set, normalized to lowercase.
    pub fn allow_set(&self) -> HashSet<String> {
        self.allowed
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| id.to_ascii_lowercase())
            .collect()
    }
}

/// Sampling thresholds, see `trk_core::sampling`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSection {
    /// Minimum movement in kilometers that always admits a fix
    pub min_distance_km: f64,
    /// Maximum age in seconds after which a fix is admitted anyway
    pub min_interval_secs: i64,
}

impl Default for SamplingSection {
    fn default() -> Self {
        let cfg = SamplingConfig::default();
        Self {
            min_distance_km: cfg.min_distance_km,
            min_interval_secs: cfg.min_interval_secs,
        }
    }
}

impl From<&SamplingSection> for SamplingConfig {
    fn from(section: &SamplingSection) -> Self {
        Self {
            min_distance_km: section.min_distance_km,
            min_interval_secs: section.min_interval_secs,
        }
    }
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "trk-server"
    }
}

impl ServerConfig {
    /// Validate cross-field configuration rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.sink.url.is_empty() {
            return Err("[sink].url must not be empty".to_string());
        }
        if !self.sink.url.starts_with("http://") && !self.sink.url.starts_with("https://") {
            return Err(format!("[sink].url must be an http(s) URL: {}", self.sink.url));
        }
        if self.sink.retry_attempts == 0 {
            return Err("[sink].retry_attempts must be at least 1".to_string());
        }
        if self.sink.timeout_secs == 0 {
            return Err("[sink].timeout_secs must be at least 1".to_string());
        }
        if self.listen.idle_timeout_secs == 0 {
            return Err("[listen].idle_timeout_secs must be at least 1".to_string());
        }
        if self.sampling.min_distance_km < 0.0 {
            return Err("[sampling].min_distance_km must not be negative".to_string());
        }
        if self.sampling.min_interval_secs < 0 {
            return Err("[sampling].min_interval_secs must not be negative".to_string());
        }
        Ok(())
    }

    /// Example configuration printed by `--print-config`.
    pub fn example_toml() -> String {
        r#"[trk-server]

[trk-server.general]
# log_level = "info"

[trk-server.listen]
listen = "0.0.0.0"
port = 5023
idle_timeout_secs = 180
ack_position_frames = false

[trk-server.sink]
url = "http://127.0.0.1:8000/api/v1/tracker/data"
# api_key = "secret"
timeout_secs = 5
retry_attempts = 3
retry_delay_ms = 1000

[trk-server.devices]
# Empty list admits every device.
allowed = []

[trk-server.sampling]
min_distance_km = 0.03
min_interval_secs = 300
"#
        .to_string()
    }
}
