//! # Rolling Metrics
//!
//! Histograms, top-K rankings and hit ratios over rolling time windows, built
//! for many concurrent writers and an occasional reporting reader.
//!
//! ## Overview
//!
//! Every metric records into a double-buffered aggregate. Writers enter a
//! short critical section, mutate the active buffer and leave; they never
//! wait for a reader. Swapping the buffers retires data: a reset-on-read
//! metric swaps on every read, a windowed metric swaps a chunk once its
//! interval has passed. The swap waits for writers still inside the retired
//! buffer. On top of that, a reset policy decides what part of the recorded
//! history is still reported.
//!
//! ## Features
//!
//! - **🔒 Non-blocking writes**: `update` never waits for `snapshot`; at a
//!   chunk boundary writers of the new interval pause until the single
//!   rotation completes
//! - **📊 Three aggregates**: HDR histograms, bounded top-K rankings, hit ratios
//! - **🔄 Reset policies**: never, on every read, periodically, by rotating
//!   chunks, or (hit ratios only) by smoothly decaying chunks
//! - **🎯 Exact accounting**: an update that completed before a read is
//!   reported by it exactly once
//! - **⏱️ Injectable time**: every metric reads a [`Clock`]; tests drive it
//!   with a [`MockClock`]
//! - **📈 Snapshot caching**: bounded read cost under heavy read pressure
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use rolling_metrics::{HistogramConfig, ResetPolicy, RollingHistogram};
//!
//! let histogram = RollingHistogram::new(&HistogramConfig {
//!     reset: ResetPolicy::ByChunks {
//!         window: Duration::from_secs(60),
//!         chunks: 6,
//!         include_current_chunk: true,
//!     },
//!     ..Default::default()
//! })
//! .expect("valid configuration");
//!
//! histogram.update(120);
//! histogram.update(80);
//!
//! let snapshot = histogram.snapshot();
//! assert_eq!(snapshot.count(), 2);
//! assert_eq!(snapshot.max(), 120);
//! ```
//!
//! ## Reset Policies
//!
//! - **`Never`**: report everything since construction or the last `reset()`
//! - **`OnSnapshot`**: each read reports what was recorded since the previous one
//! - **`Periodically`**: forget everything once per period
//! - **`ByChunks`**: split the window into chunks and drop the oldest chunk as
//!   time moves on, optionally hiding the chunk still being written
//! - **`SmoothlyDecaying`**: like `ByChunks`, but the oldest chunk fades out
//!   linearly (hit ratios only)
//!
//! ## Configuration
//!
//! Configurations are plain `serde` structs with defaults and can be loaded
//! from TOML:
//!
//! ```rust
//! use rolling_metrics::{TopConfig, config};
//!
//! let top: TopConfig = config::from_toml_str(r#"
//!     size = 5
//!
//!     [reset]
//!     type = "periodically"
//!     period = { secs = 60, nanos = 0 }
//! "#).unwrap();
//!
//! assert_eq!(top.size, 5);
//! ```
//!
//! Validation runs once, when a metric is built. After that `update`,
//! `snapshot` and `reset` cannot fail.
//!
//! ## Empty Windows
//!
//! A window without data is a normal outcome, not an error: histograms
//! report zeros, tops report an empty rating and hit ratios report `0.0`.
//!
//! ## Cargo Features
//!
//! - **`background-clock`**: `BackgroundClock`, a clock refreshed by a
//!   tokio task so that writers read one atomic instead of the system clock

pub(crate) mod phaser;
pub(crate) mod window;

pub mod aggregate;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod recorder;
pub mod types;

pub use aggregate::Aggregate;
#[cfg(feature = "background-clock")]
pub use clock::BackgroundClock;
pub use clock::{Clock, MockClock, SystemClock};
pub use collector::{Position, PositionCollector};
pub use config::{HistogramConfig, HitRatioConfig, OverflowPolicy, ResetPolicy, TopConfig};
pub use error::{ConfigError, Result};
pub use recorder::PhasedRecorder;
pub use types::{HistogramSnapshot, HitRatio, Percentile, RollingHistogram, Top};
