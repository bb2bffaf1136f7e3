use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::aggregate::Aggregate;
use crate::clock::{Clock, SystemClock};
use crate::config::{HistogramConfig, OverflowPolicy, Validate};
use crate::error::Result;
use crate::window::RollingWindow;

/// A latency histogram over a configurable rolling window.
///
/// ## Overview
///
/// `RollingHistogram` records `u64` values into an HDR histogram engine and
/// reports count, min, max, mean, standard deviation and quantiles for the
/// data still inside its window. How old data is forgotten is chosen by the
/// [`ResetPolicy`](crate::ResetPolicy) in its configuration.
///
/// ## Recording
///
/// `update` never waits for a reader to finish a snapshot. The active engine
/// is split into stripes, one per core up to eight; a writer takes
/// the first free stripe starting from its own and only queues behind
/// another writer when every stripe is busy. Snapshots combine the stripes.
///
/// ## Overflow
///
/// With a highest trackable value configured, larger values are handled
/// according to [`OverflowPolicy`]: dropped, clamped to the bound, or passed
/// to an engine that grows its range on demand. Without a bound the engine
/// always grows.
///
/// ## Example Usage
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rolling_metrics::{HistogramConfig, MockClock, ResetPolicy, RollingHistogram};
///
/// let clock = MockClock::new(0);
/// let config = HistogramConfig {
///     reset: ResetPolicy::ByChunks {
///         window: Duration::from_secs(3),
///         chunks: 3,
///         include_current_chunk: true,
///     },
///     snapshot_caching: Duration::ZERO,
///     ..Default::default()
/// };
/// let histogram = RollingHistogram::with_clock(&config, Arc::new(clock.clone())).unwrap();
///
/// histogram.update(10);
/// histogram.update(20);
/// assert_eq!(histogram.snapshot().max(), 20);
///
/// clock.advance(2_999);
/// assert_eq!(histogram.snapshot().max(), 20);
///
/// clock.advance(1);
/// assert_eq!(histogram.snapshot().count(), 0);
/// ```
#[derive(Debug)]
pub struct RollingHistogram {
    window: RollingWindow<HdrAccumulator>,
}

impl RollingHistogram {
    pub fn new(config: &HistogramConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &HistogramConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let prototype = HdrAccumulator::new(config)?;
        let window = RollingWindow::new(prototype, &config.reset, clock, config.snapshot_caching)?;

        debug!(
            policy = config.reset.name(),
            significant_digits = config.significant_digits,
            highest_trackable_value = ?config.highest_trackable_value,
            "Created rolling histogram"
        );

        Ok(Self { window })
    }

    #[inline]
    pub fn update(&self, value: u64) {
        self.window.record(|accumulator| accumulator.record(value));
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.window.snapshot()
    }

    pub fn reset(&self) {
        self.window.reset();
        debug!("Reset rolling histogram");
    }
}

/// Upper bound on engine stripes per accumulator.
pub(crate) const MAX_STRIPES: usize = 8;

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HOME_STRIPE: usize = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed);
}

/// HDR histogram engine shared between writers of one recorder slot.
#[derive(Debug)]
pub(crate) struct HdrAccumulator {
    stripes: Box<[Mutex<Histogram<u64>>]>,
    overflow: OverflowPolicy,
    highest: Option<u64>,
    percentiles: Option<Arc<[f64]>>,
}

impl HdrAccumulator {
    pub(crate) fn new(config: &HistogramConfig) -> Result<Self> {
        let digits = config.significant_digits;
        let histogram = match config.highest_trackable_value {
            None => Histogram::new(digits)?,
            Some(highest) => {
                let lowest = config.lowest_discernible_value.unwrap_or(1);
                let mut histogram = Histogram::new_with_bounds(lowest, highest, digits)?;
                histogram.auto(config.overflow == OverflowPolicy::PassThru);
                histogram
            }
        };

        let stripes = std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(MAX_STRIPES);

        Ok(Self {
            stripes: striped(&histogram, stripes),
            overflow: config.overflow,
            highest: config.highest_trackable_value,
            percentiles: config.percentiles.as_deref().map(Arc::from),
        })
    }

    #[inline]
    pub(crate) fn record(&self, value: u64) {
        let value = match (self.overflow, self.highest) {
            (OverflowPolicy::Skip, Some(highest)) if value > highest => return,
            (OverflowPolicy::ReduceToHighestTrackable, Some(highest)) => value.min(highest),
            _ => value,
        };

        let len = self.stripes.len();
        let home = HOME_STRIPE.with(|stripe| *stripe) % len;
        let mut histogram = (0..len)
            .find_map(|offset| self.stripes[(home + offset) % len].try_lock())
            .unwrap_or_else(|| self.stripes[home].lock());

        if histogram.record(value).is_err() {
            histogram.saturating_record(value);
        }
    }

    /// All stripes folded into one engine.
    fn combined(&self) -> Histogram<u64> {
        let mut combined = self.stripes[0].lock().clone();
        for stripe in &self.stripes[1..] {
            add_or_warn(&mut combined, &stripe.lock());
        }
        combined
    }
}

fn striped(prototype: &Histogram<u64>, stripes: usize) -> Box<[Mutex<Histogram<u64>>]> {
    (0..stripes.max(1))
        .map(|_| {
            let mut histogram = prototype.clone();
            histogram.reset();
            Mutex::new(histogram)
        })
        .collect()
}

fn add_or_warn(target: &mut Histogram<u64>, source: &Histogram<u64>) {
    if let Err(error) = target.add(source) {
        warn!(?error, count = source.len(), "Histogram merge rejected, skipping");
    }
}

impl Aggregate for HdrAccumulator {
    type Snapshot = HistogramSnapshot;

    fn create_empty_copy(&self) -> Self {
        let prototype = self.stripes[0].lock().clone();

        Self {
            stripes: striped(&prototype, self.stripes.len()),
            overflow: self.overflow,
            highest: self.highest,
            percentiles: self.percentiles.clone(),
        }
    }

    fn reset(&self) {
        for stripe in self.stripes.iter() {
            stripe.lock().reset();
        }
    }

    fn merge_from(&self, other: &Self) {
        let len = self.stripes.len();
        for (index, source) in other.stripes.iter().enumerate() {
            add_or_warn(&mut self.stripes[index % len].lock(), &source.lock());
        }
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot::from_engine(&self.combined(), self.percentiles.as_deref())
    }
}

/// A quantile and the value recorded at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentile {
    pub quantile: f64,
    pub value: u64,
}

/// Immutable statistics of a [`RollingHistogram`] at one point in time.
///
/// When the histogram was configured with predefined percentiles only those
/// are kept, and [`value_at_quantile`](Self::value_at_quantile) answers with
/// the first predefined percentile at or above the requested quantile.
/// Otherwise the snapshot holds a copy of the engine and answers any
/// quantile exactly as the engine would.
///
/// An empty window yields zeros everywhere.
#[derive(Debug, Clone, Default)]
pub struct HistogramSnapshot {
    count: u64,
    min: u64,
    max: u64,
    mean: f64,
    stddev: f64,
    percentiles: Vec<Percentile>,
    engine: Option<Arc<Histogram<u64>>>,
}

impl HistogramSnapshot {
    fn from_engine(histogram: &Histogram<u64>, predefined: Option<&[f64]>) -> Self {
        let count = histogram.len();
        if count == 0 {
            return Self {
                percentiles: predefined
                    .unwrap_or_default()
                    .iter()
                    .map(|&quantile| Percentile { quantile, value: 0 })
                    .collect(),
                ..Self::default()
            };
        }

        let (percentiles, engine) = match predefined {
            Some(quantiles) => (
                quantiles
                    .iter()
                    .map(|&quantile| Percentile {
                        quantile,
                        value: histogram.value_at_quantile(quantile),
                    })
                    .collect(),
                None,
            ),
            None => (Vec::new(), Some(Arc::new(histogram.clone()))),
        };

        Self {
            count,
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            stddev: histogram.stdev(),
            percentiles,
            engine,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    pub fn median(&self) -> u64 {
        self.value_at_quantile(0.5)
    }

    /// Predefined percentiles, empty when the histogram was configured
    /// without them.
    pub fn percentiles(&self) -> &[Percentile] {
        &self.percentiles
    }

    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }

        match &self.engine {
            Some(engine) => engine.value_at_quantile(quantile),
            None => self
                .percentiles
                .iter()
                .find(|percentile| percentile.quantile >= quantile)
                .map_or(self.max, |percentile| percentile.value),
        }
    }
}
