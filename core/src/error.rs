use std::time::Duration;

use thiserror::Error;

/// Configuration errors raised while constructing a metric.
///
/// Validation happens once, at construction time. After a metric exists,
/// `update`, `snapshot` and `reset` are total and never report errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number of chunks: {chunks} (must be between 1 and {max})")]
    InvalidChunkCount { chunks: usize, max: usize },

    #[error("Chunk duration too short: {chunk:?} (must be >= {min:?})")]
    ChunkTooShort { chunk: Duration, min: Duration },

    #[error("Invalid reset period: {period:?} (must be >= {min:?})")]
    InvalidResetPeriod { period: Duration, min: Duration },

    #[error("Reset policy `{policy}` is not supported by {metric}")]
    UnsupportedPolicy {
        policy: &'static str,
        metric: &'static str,
    },

    #[error("Invalid top size: {size} (must be between 1 and {max})")]
    InvalidTopSize { size: usize, max: usize },

    #[error("Maximum description length too short: {length} (must be >= {min})")]
    DescriptionTooShort { length: usize, min: usize },

    #[error("Predefined percentiles must not be empty")]
    EmptyPercentiles,

    #[error("Invalid percentile: {value} (must be between 0.0 and 1.0)")]
    InvalidPercentile { value: f64 },

    #[error("Invalid significant digits: {digits} (must be between 0 and {max})")]
    InvalidSignificantDigits { digits: u8, max: u8 },

    #[error("Invalid lowest discernible value: {value} (must be >= 1)")]
    InvalidLowestDiscernibleValue { value: u64 },

    #[error("Invalid highest trackable value: {highest} (must be >= 2 * lowest = {lowest})")]
    InvalidHighestTrackableValue { highest: u64, lowest: u64 },

    #[error("Highest trackable value is required when lowest discernible value {lowest} is set")]
    MissingHighestTrackableValue { lowest: u64 },

    #[error("Histogram engine rejected configuration: {0}")]
    Engine(#[from] hdrhistogram::CreationError),

    #[error("Invalid configuration format: {message}")]
    InvalidFormat { message: String },

    #[error("Failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
