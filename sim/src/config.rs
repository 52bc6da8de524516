use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use task_format::Lane;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("at least one worker is required")]
    NoWorkers,

    #[error("lane threshold must be a number, got {0}")]
    InvalidThreshold(f64),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("time scale must be finite and non-negative, got {0}")]
    InvalidTimeScale(f64),
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneConfig {
    /// Workers pulling from the fast lane first.
    #[serde(default = "default_fast_workers")]
    pub fast_workers: usize,
    /// Workers pulling from the slow lane first.
    #[serde(default = "default_slow_workers")]
    pub slow_workers: usize,
    /// Tasks with `cost <= threshold` are routed fast.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Backpressure sampling period in milliseconds.
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    /// Stats report period in milliseconds.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Milliseconds of simulated work per unit of task cost.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Longest an idle worker blocks on one lane before polling the other.
    #[serde(default = "default_idle_backoff_max_ms")]
    pub idle_backoff_max_ms: u64,
}

fn default_fast_workers() -> usize { 1 }
fn default_slow_workers() -> usize { 1 }
fn default_threshold() -> f64 { 1000.0 }
fn default_sampling_interval_ms() -> u64 { 50 }
fn default_report_interval_ms() -> u64 { 30_000 }
fn default_time_scale() -> f64 { 1.0 }
fn default_idle_backoff_max_ms() -> u64 { 8 }

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            fast_workers: default_fast_workers(),
            slow_workers: default_slow_workers(),
            threshold: default_threshold(),
            sampling_interval_ms: default_sampling_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
            time_scale: default_time_scale(),
            idle_backoff_max_ms: default_idle_backoff_max_ms(),
        }
    }
}

impl LaneConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_workers() == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.threshold.is_nan() {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("sampling_interval_ms"));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("report_interval_ms"));
        }
        if self.idle_backoff_max_ms == 0 {
            return Err(ConfigError::ZeroInterval("idle_backoff_max_ms"));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(ConfigError::InvalidTimeScale(self.time_scale));
        }
        Ok(())
    }

    pub fn total_workers(&self) -> usize {
        self.fast_workers + self.slow_workers
    }

    pub fn workers(&self, lane: Lane) -> usize {
        match lane {
            Lane::Fast => self.fast_workers,
            Lane::Slow => self.slow_workers,
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn idle_backoff_max(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_max_ms)
    }
}
