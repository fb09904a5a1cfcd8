//! Configuration management for Sdkguard.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SdkError};

/// Environment variable prefix used by [`SdkConfig::load`].
pub const ENV_PREFIX: &str = "SDKGUARD";

/// Largest bucket ring the limiter will allocate.
pub const MAX_MOVING_AVERAGE_BUCKETS: u64 = 1 << 16;

/// Longest moving average window accepted, one year.
pub const MAX_MOVING_AVERAGE_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Main configuration for an SDK session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Client-side rate limiter configuration
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables for the client-side rate limiter.
///
/// The limiter counts requests in buckets of `seconds_per_bucket` seconds.
/// `buckets_per_time_frame` buckets form one tripwire time frame, and the
/// moving average spans `count_moving_average_across_n_tripwire_time_frames`
/// of those frames.
///
/// The ring length (`RateLimitMovingAverageBucketCount`) is not a separate
/// setting: it is always `buckets_per_time_frame` times the number of
/// averaged frames, so the tripwire window always fits inside the ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// When false the limiter never reports a rate limit
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Width of one bucket in seconds
    #[serde(default = "default_seconds_per_bucket")]
    pub seconds_per_bucket: u32,

    /// Number of buckets in one tripwire time frame
    #[serde(default = "default_buckets_per_time_frame")]
    pub buckets_per_time_frame: u32,

    /// Number of tripwire time frames covered by the moving average
    #[serde(default = "default_moving_average_time_frames")]
    pub count_moving_average_across_n_tripwire_time_frames: u32,

    /// Hard ceiling of requests inside one tripwire time frame
    #[serde(default = "default_max_requests_per_time_frame")]
    pub max_requests_per_tripwire_time_frame: u32,

    /// Fraction of the hard ceiling the moving average may reach per frame
    #[serde(default = "default_moving_average_threshold_ratio")]
    pub moving_average_threshold_ratio: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            seconds_per_bucket: default_seconds_per_bucket(),
            buckets_per_time_frame: default_buckets_per_time_frame(),
            count_moving_average_across_n_tripwire_time_frames:
                default_moving_average_time_frames(),
            max_requests_per_tripwire_time_frame: default_max_requests_per_time_frame(),
            moving_average_threshold_ratio: default_moving_average_threshold_ratio(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_seconds_per_bucket() -> u32 {
    5
}

fn default_buckets_per_time_frame() -> u32 {
    12
}

fn default_moving_average_time_frames() -> u32 {
    3
}

fn default_max_requests_per_time_frame() -> u32 {
    280
}

fn default_moving_average_threshold_ratio() -> f64 {
    0.8
}

impl RateLimiterConfig {
    /// A configuration identical to the default one but with limiting switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Length of one tripwire time frame in seconds.
    pub fn tripwire_time_frame_seconds(&self) -> u64 {
        self.seconds_per_bucket as u64 * self.buckets_per_time_frame as u64
    }

    /// Number of buckets in the moving average window (the length of the ring).
    pub fn moving_average_bucket_count(&self) -> usize {
        self.buckets_per_time_frame as usize
            * self.count_moving_average_across_n_tripwire_time_frames as usize
    }

    /// Length of the whole moving average window in seconds.
    pub fn moving_average_window_seconds(&self) -> u64 {
        self.seconds_per_bucket as u64 * self.moving_average_bucket_count() as u64
    }

    /// Per-frame request rate above which the moving average trips.
    pub fn moving_average_threshold(&self) -> f64 {
        self.max_requests_per_tripwire_time_frame as f64 * self.moving_average_threshold_ratio
    }

    /// Reject settings that cannot produce a working limiter.
    pub fn validate(&self) -> Result<()> {
        if self.seconds_per_bucket == 0 {
            return Err(SdkError::InvalidConfig(
                "seconds_per_bucket must be greater than zero".to_string(),
            ));
        }
        if self.buckets_per_time_frame == 0 {
            return Err(SdkError::InvalidConfig(
                "buckets_per_time_frame must be greater than zero".to_string(),
            ));
        }
        if self.count_moving_average_across_n_tripwire_time_frames == 0 {
            return Err(SdkError::InvalidConfig(
                "count_moving_average_across_n_tripwire_time_frames must be greater than zero"
                    .to_string(),
            ));
        }
        if self.max_requests_per_tripwire_time_frame == 0 {
            return Err(SdkError::InvalidConfig(
                "max_requests_per_tripwire_time_frame must be greater than zero".to_string(),
            ));
        }

        let bucket_count = self.buckets_per_time_frame as u64
            * self.count_moving_average_across_n_tripwire_time_frames as u64;
        if bucket_count > MAX_MOVING_AVERAGE_BUCKETS {
            return Err(SdkError::InvalidConfig(format!(
                "moving average window spans {} buckets, at most {} allowed",
                bucket_count, MAX_MOVING_AVERAGE_BUCKETS
            )));
        }
        match bucket_count.checked_mul(self.seconds_per_bucket as u64) {
            Some(secs) if secs <= MAX_MOVING_AVERAGE_WINDOW_SECS => {}
            _ => {
                return Err(SdkError::InvalidConfig(format!(
                    "moving average window must not exceed {} seconds",
                    MAX_MOVING_AVERAGE_WINDOW_SECS
                )));
            }
        }

        if !(self.moving_average_threshold_ratio > 0.0 && self.moving_average_threshold_ratio <= 1.0)
        {
            return Err(SdkError::InvalidConfig(format!(
                "moving_average_threshold_ratio must be in (0, 1], got {}",
                self.moving_average_threshold_ratio
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by `RUST_LOG` when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SdkConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading SDK configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SdkConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SdkError::Config(format!("Failed to parse SDK config: {}", e)))?;
        config.rate_limiter.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then `SDKGUARD__*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `SDKGUARD__RATE_LIMITER__ENABLED=false`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Layering SDK configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: SdkConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.rate_limiter.validate()?;
        Ok(config)
    }
}
