use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the number of chunks a rolling window may be split into.
pub const MAX_CHUNKS: usize = 25;

/// Shortest allowed chunk, and shortest allowed periodic reset.
pub const MIN_CHUNK_DURATION: Duration = Duration::from_secs(1);

pub const MAX_TOP_SIZE: usize = 1000;

pub const MIN_DESCRIPTION_LENGTH: usize = 10;

pub const MAX_SIGNIFICANT_DIGITS: u8 = 5;

/// How a metric forgets old data.
///
/// ```toml
/// [reset]
/// type = "by_chunks"
/// window = { secs = 60, nanos = 0 }
/// chunks = 6
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Accumulate everything since construction or the last `reset()`.
    #[default]
    Never,
    /// Every read starts a fresh accumulation.
    OnSnapshot,
    /// Discard everything once per `period`.
    Periodically { period: Duration },
    /// Split `window` into `chunks` equal intervals and drop the oldest one
    /// as time moves on.
    ByChunks {
        window: Duration,
        chunks: usize,
        /// Whether the interval still being written counts towards reads.
        #[serde(default = "default_include_current_chunk")]
        include_current_chunk: bool,
    },
    /// Like `ByChunks`, but the oldest interval fades out linearly instead of
    /// disappearing at once. Hit ratios only.
    SmoothlyDecaying { window: Duration, chunks: usize },
}

fn default_include_current_chunk() -> bool {
    true
}

impl ResetPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ResetPolicy::Never => "never",
            ResetPolicy::OnSnapshot => "on_snapshot",
            ResetPolicy::Periodically { .. } => "periodically",
            ResetPolicy::ByChunks { .. } => "by_chunks",
            ResetPolicy::SmoothlyDecaying { .. } => "smoothly_decaying",
        }
    }
}

/// What a histogram does with values above its highest trackable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the value.
    Skip,
    /// Record the highest trackable value instead.
    #[default]
    ReduceToHighestTrackable,
    /// Let the engine grow its range to fit the value.
    PassThru,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub reset: ResetPolicy,
    /// Decimal digits of precision kept by the engine (default 2)
    pub significant_digits: u8,
    pub lowest_discernible_value: Option<u64>,
    /// Without a bound the engine resizes itself as values grow
    pub highest_trackable_value: Option<u64>,
    pub overflow: OverflowPolicy,
    /// Quantiles in `[0, 1]` to keep in snapshots. `None` keeps the engine.
    pub percentiles: Option<Vec<f64>>,
    /// How long a computed snapshot is served to later readers (default 1s)
    pub snapshot_caching: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopConfig {
    /// Number of positions kept (default 10)
    pub size: usize,
    pub reset: ResetPolicy,
    /// Latencies below this are never ranked
    pub slow_threshold: Duration,
    /// Descriptions longer than this are truncated (default 1000 chars)
    pub max_description_length: usize,
    pub snapshot_caching: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitRatioConfig {
    pub reset: ResetPolicy,
    /// Ratios are cheap to compute, so caching is off by default
    pub snapshot_caching: Duration,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            reset: ResetPolicy::Never,
            significant_digits: 2,
            lowest_discernible_value: None,
            highest_trackable_value: None,
            overflow: OverflowPolicy::default(),
            percentiles: None,
            snapshot_caching: Duration::from_secs(1),
        }
    }
}

impl Default for TopConfig {
    fn default() -> Self {
        Self {
            size: 10,
            reset: ResetPolicy::Never,
            slow_threshold: Duration::ZERO,
            max_description_length: 1000,
            snapshot_caching: Duration::from_secs(1),
        }
    }
}

impl Default for HitRatioConfig {
    fn default() -> Self {
        Self {
            reset: ResetPolicy::Never,
            snapshot_caching: Duration::ZERO,
        }
    }
}
