//! Engine configuration.
//!
//! One YAML document holds the engine settings and the workload:
//!
//! ```yaml
//! clock:
//!   start: 2024-01-01T00:00:00Z
//!   tick_interval: 1s
//!   mode:
//!     type: accelerated
//! sink:
//!   type: local
//!   dir: ./cdc-out
//! batching:
//!   max_events: 1000
//!   max_bytes: 4194304
//!   partition_window: 1h
//! retry:
//!   max_attempts: 5
//!   initial_backoff: 100ms
//!   multiplier: 2.0
//!   max_backoff: 10s
//! checkpoint:
//!   dir: ./cdc-checkpoints
//!   lease_ttl: 60s
//! channel_capacity: 64
//! max_ticks: 1000
//! workload:
//!   seed: 42
//!   tables: [...]
//! ```

pub mod duration;

pub use duration::parse_duration;

use cdc_generator::{ClockMode, SimulationClock, WorkloadConfig, WorkloadError};
use cdc_sink::{BatchConfig, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error reading the config file
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Error parsing YAML
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid workload section
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// Semantically invalid engine setting
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Simulated time
    #[serde(default)]
    pub clock: ClockConfig,

    /// Where objects are written
    pub sink: SinkConfig,

    /// Batch bounds
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Retry schedule for unavailable sinks
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checkpoint location and lease
    pub checkpoint: CheckpointConfig,

    /// Transactions buffered between producer and writer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Last tick to produce; unbounded when absent
    #[serde(default)]
    pub max_ticks: Option<u64>,

    /// Simulated database and its change mix
    pub workload: WorkloadConfig,
}

fn default_channel_capacity() -> usize {
    64
}

impl EngineConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.channel_capacity == 0 {
            return invalid("channel_capacity must be at least 1");
        }
        if self.batching.max_events == 0 {
            return invalid("batching.max_events must be at least 1");
        }
        if self.batching.max_bytes == 0 {
            return invalid("batching.max_bytes must be at least 1");
        }
        if self.batching.partition_window.is_zero() {
            return invalid("batching.partition_window must be positive");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be at least 1.0");
        }
        if self.checkpoint.lease_ttl.is_zero() {
            return invalid("checkpoint.lease_ttl must be positive");
        }
        if let ClockMode::WallClock { speedup } = self.clock.mode {
            if !speedup.is_finite() || speedup <= 0.0 {
                return invalid("clock.mode.speedup must be positive");
            }
        }

        self.workload.validate()?;
        Ok(())
    }

    /// Clock mapping ticks to commit timestamps.
    pub fn simulation_clock(&self) -> SimulationClock {
        SimulationClock::new(self.clock.start, self.clock.tick_interval)
    }
}

/// Simulated time settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    /// Simulated time of tick 1
    #[serde(default = "default_start")]
    pub start: DateTime<Utc>,

    /// Simulated time between ticks
    #[serde(default = "default_tick_interval", deserialize_with = "duration::deserialize")]
    pub tick_interval: Duration,

    /// Pacing against real time
    #[serde(default)]
    pub mode: ClockMode,
}

fn default_start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default() // 2024-01-01
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            tick_interval: default_tick_interval(),
            mode: ClockMode::default(),
        }
    }
}

/// Object sink selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Files under a local directory
    Local { dir: PathBuf },
    /// Objects in an S3 bucket; credentials come from the AWS environment
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
}

/// Batch bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchingConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(
        default = "default_partition_window",
        deserialize_with = "duration::deserialize"
    )]
    pub partition_window: Duration,
}

fn default_max_events() -> usize {
    BatchConfig::default().max_events
}

fn default_max_bytes() -> usize {
    BatchConfig::default().max_bytes
}

fn default_partition_window() -> Duration {
    BatchConfig::default().partition_window
}

impl Default for BatchingConfig {
    fn default() -> Self {
        BatchConfig::default().into()
    }
}

impl From<BatchConfig> for BatchingConfig {
    fn from(c: BatchConfig) -> Self {
        Self {
            max_events: c.max_events,
            max_bytes: c.max_bytes,
            partition_window: c.partition_window,
        }
    }
}

impl From<&BatchingConfig> for BatchConfig {
    fn from(c: &BatchingConfig) -> Self {
        Self {
            max_events: c.max_events,
            max_bytes: c.max_bytes,
            partition_window: c.partition_window,
        }
    }
}

/// Retry schedule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(
        default = "default_initial_backoff",
        deserialize_with = "duration::deserialize"
    )]
    pub initial_backoff: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(
        default = "default_max_backoff",
        deserialize_with = "duration::deserialize"
    )]
    pub max_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_initial_backoff() -> Duration {
    RetryPolicy::default().initial_backoff
}

fn default_multiplier() -> f64 {
    RetryPolicy::default().multiplier
}

fn default_max_backoff() -> Duration {
    RetryPolicy::default().max_backoff
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            multiplier: default_multiplier(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            initial_backoff: c.initial_backoff,
            multiplier: c.multiplier,
            max_backoff: c.max_backoff,
        }
    }
}

/// Checkpoint location and single-writer lease.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Directory holding `{instance}.checkpoint.json` and `{instance}.lease`
    pub dir: PathBuf,

    /// Instance name, overridable with `--instance`
    #[serde(default = "default_instance")]
    pub instance: String,

    /// A lease not renewed for this long may be taken over
    #[serde(default = "default_lease_ttl", deserialize_with = "duration::deserialize")]
    pub lease_ttl: Duration,
}

fn default_instance() -> String {
    "cdc-sim".to_string()
}

fn default_lease_ttl() -> Duration {
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKLOAD: &str = r#"
workload:
  seed: 7
  tables:
    - name: orders
      primary_key:
        name: id
        type: big_int
        generator:
          type: sequential
      columns:
        - name: status
          type: text
          generator:
            type: one_of
            values: [pending, paid]
"#;

    fn minimal() -> String {
        format!("sink:\n  type: local\n  dir: /tmp/out\ncheckpoint:\n  dir: /tmp/cp\n{WORKLOAD}")
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_yaml(&minimal()).unwrap();

        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.max_ticks, None);
        assert_eq!(config.clock.tick_interval, Duration::from_secs(1));
        assert_eq!(config.clock.start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(config.clock.mode, ClockMode::Accelerated);
        assert_eq!(BatchConfig::from(&config.batching), BatchConfig::default());
        assert_eq!(RetryPolicy::from(&config.retry), RetryPolicy::default());
        assert_eq!(config.checkpoint.instance, "cdc-sim");
        assert_eq!(config.checkpoint.lease_ttl, Duration::from_secs(60));
        assert_eq!(
            config.sink,
            SinkConfig::Local {
                dir: PathBuf::from("/tmp/out")
            }
        );
    }

    #[test]
    fn test_full_config() {
        let yaml = format!(
            r#"
clock:
  start: 2023-06-01T12:00:00Z
  tick_interval: 250ms
  mode:
    type: wall_clock
    speedup: 10
sink:
  type: s3
  bucket: cdc-bucket
  prefix: sim/
batching:
  max_events: 10
  max_bytes: 2048
  partition_window: 15m
retry:
  max_attempts: 3
  initial_backoff: 50ms
  multiplier: 3.0
  max_backoff: 2s
checkpoint:
  dir: /var/lib/cdc
  instance: orders-sim
  lease_ttl: 5m
channel_capacity: 8
max_ticks: 500
{WORKLOAD}"#
        );
        let config = EngineConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.clock.tick_interval, Duration::from_millis(250));
        assert_eq!(config.clock.mode, ClockMode::WallClock { speedup: 10.0 });
        assert_eq!(
            config.sink,
            SinkConfig::S3 {
                bucket: "cdc-bucket".to_string(),
                prefix: "sim/".to_string()
            }
        );
        assert_eq!(config.batching.partition_window, Duration::from_secs(900));
        let retry = RetryPolicy::from(&config.retry);
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.checkpoint.instance, "orders-sim");
        assert_eq!(config.checkpoint.lease_ttl, Duration::from_secs(300));
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.max_ticks, Some(500));
        assert_eq!(config.workload.seed, 7);
    }

    #[test]
    fn test_durations_as_seconds() {
        let yaml = format!("clock:\n  tick_interval: 2\n{}", minimal());
        let config = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.clock.tick_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_settings() {
        for extra in [
            "channel_capacity: 0\n",
            "batching:\n  max_events: 0\n",
            "batching:\n  partition_window: 0s\n",
            "retry:\n  max_attempts: 0\n",
            "retry:\n  multiplier: 0.5\n",
        ] {
            let yaml = format!("{extra}{}", minimal());
            assert!(
                matches!(EngineConfig::from_yaml(&yaml), Err(ConfigError::Invalid(_))),
                "accepted: {extra}"
            );
        }
    }

    #[test]
    fn test_bad_duration_and_unknown_field() {
        let yaml = format!("clock:\n  tick_interval: soon\n{}", minimal());
        assert!(matches!(EngineConfig::from_yaml(&yaml), Err(ConfigError::Yaml(_))));

        let yaml = format!("bogus: 1\n{}", minimal());
        assert!(matches!(EngineConfig::from_yaml(&yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_file("/nonexistent/cdc-sim.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
