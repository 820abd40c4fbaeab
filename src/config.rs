//! Server configuration loaded from a TOML file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pip::DatasetSource;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub listen: String,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    pub log_format: LogFormat,
    /// Path answering 200 for load balancer probes (not rate limited)
    pub health_check_endpoint: String,
    /// Take the client IP from `X-Forwarded-For` instead of the socket peer
    pub trust_proxy: bool,
    /// Directory holding `index.html`
    pub static_dir: PathBuf,
    /// Water datasets, queried in this order
    pub datasets: Vec<DatasetSource>,
    pub rate_limit: RateLimitConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Length of the rate limit window in milliseconds
    pub window_ms: u64,
    /// Requests allowed per client within one window
    pub max: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
    pub service_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            health_check_endpoint: "/health".to_string(),
            trust_proxy: false,
            static_dir: PathBuf::from("public"),
            datasets: vec![
                DatasetSource::new("seas", "data/earth-seas-1m.geo.json.gz"),
                DatasetSource::new("lakes", "data/earth-lakes-1m.geo.json.gz"),
                DatasetSource::new("rivers", "data/earth-rivers-1m.geo.json.gz"),
            ],
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max: 100,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "onwater".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.health_check_endpoint.starts_with('/') {
            bail!(
                "health_check_endpoint must start with '/', got '{}'",
                self.health_check_endpoint
            );
        }
        if matches!(self.health_check_endpoint.as_str(), "/" | "/api/is-on-water") {
            bail!(
                "health_check_endpoint '{}' collides with an API route",
                self.health_check_endpoint
            );
        }
        if self.datasets.is_empty() {
            bail!("at least one dataset must be configured");
        }
        if self.rate_limit.enabled && (self.rate_limit.window_ms == 0 || self.rate_limit.max == 0) {
            bail!("rate_limit.window_ms and rate_limit.max must be positive");
        }
        Ok(())
    }
}
