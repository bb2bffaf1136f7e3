use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::clock::{Clock, SystemClock, millis};
use crate::collector::{Position, PositionCollector};
use crate::config::{TopConfig, Validate};
use crate::error::Result;
use crate::window::RollingWindow;

/// The slowest operations seen within a rolling window, with descriptions.
///
/// ## Overview
///
/// `Top` keeps at most `size` positions, strictly descending by latency. An
/// operation slower than the configured threshold is offered to the ranking;
/// its description is built only when the operation actually makes it in,
/// so describing a query costs nothing for the common fast case.
///
/// Descriptions longer than the configured maximum are cut on a character
/// boundary.
///
/// ## Example Usage
///
/// ```rust
/// use std::time::Duration;
/// use rolling_metrics::{Top, TopConfig};
///
/// let top = Top::new(&TopConfig { size: 2, ..Default::default() }).unwrap();
///
/// top.update(Duration::from_millis(10), || "SELECT 1".to_string());
/// top.update(Duration::from_millis(30), || "SELECT 3".to_string());
/// top.update(Duration::from_millis(20), || "SELECT 2".to_string());
///
/// let rating = top.descending_rating();
/// assert_eq!(rating[0].latency(), Duration::from_millis(30));
/// assert_eq!(rating[1].description(), "SELECT 2");
/// ```
#[derive(Debug)]
pub struct Top {
    window: RollingWindow<TopAccumulator>,
    size: usize,
    slow_threshold_nanos: u64,
    max_description_length: usize,
}

impl Top {
    pub fn new(config: &TopConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &TopConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let prototype = TopAccumulator::new(config.size);
        let window = RollingWindow::new(prototype, &config.reset, clock, config.snapshot_caching)?;

        debug!(
            policy = config.reset.name(),
            size = config.size,
            slow_threshold_ms = millis(config.slow_threshold),
            "Created top"
        );

        Ok(Self {
            window,
            size: config.size,
            slow_threshold_nanos: as_nanos(config.slow_threshold),
            max_description_length: config.max_description_length,
        })
    }

    /// Offers an operation to the ranking.
    ///
    /// Returns `true` if it entered the ranking of the interval currently
    /// being recorded. Without resets that is the whole ranking. With chunks
    /// or periods an operation can enter its own interval while an older
    /// interval of the window still holds slower ones.
    #[inline]
    pub fn update(&self, latency: Duration, description: impl FnOnce() -> String) -> bool {
        let nanos = as_nanos(latency);
        if nanos < self.slow_threshold_nanos {
            return false;
        }

        let max_length = self.max_description_length;
        self.window
            .record(|top| top.add(nanos, || truncate(description(), max_length)))
    }

    /// Positions of the current window, slowest first.
    pub fn descending_rating(&self) -> Vec<Position> {
        self.window.snapshot()
    }

    pub fn reset(&self) {
        self.window.reset();
        debug!("Reset top");
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn truncate(mut description: String, max_chars: usize) -> String {
    if let Some((index, _)) = description.char_indices().nth(max_chars) {
        description.truncate(index);
    }
    description
}

/// A position collector safe to share between writers.
///
/// `floor` caches one more than the smallest held value while the collector
/// is full, and zero otherwise, so most values that cannot make it into the
/// ranking are rejected without taking the lock.
#[derive(Debug)]
pub(crate) struct TopAccumulator {
    collector: Mutex<PositionCollector>,
    floor: AtomicU64,
}

impl TopAccumulator {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            collector: Mutex::new(PositionCollector::new(size)),
            floor: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn add(&self, value: u64, description: impl FnOnce() -> String) -> bool {
        if value < self.floor.load(Ordering::Relaxed) {
            return false;
        }

        let mut collector = self.collector.lock();
        let added = collector.add(value, description);
        if added {
            self.update_floor(&collector);
        }
        added
    }

    fn update_floor(&self, collector: &PositionCollector) {
        let floor = match collector.min_value() {
            Some(min) if collector.is_full() => min.saturating_add(1),
            _ => 0,
        };
        self.floor.store(floor, Ordering::Relaxed);
    }
}

impl Aggregate for TopAccumulator {
    type Snapshot = Vec<Position>;

    fn create_empty_copy(&self) -> Self {
        Self::new(self.collector.lock().capacity())
    }

    fn reset(&self) {
        let mut collector = self.collector.lock();
        collector.reset();
        self.floor.store(0, Ordering::Relaxed);
    }

    fn merge_from(&self, other: &Self) {
        let source = other.collector.lock();
        let mut target = self.collector.lock();
        source.add_into(&mut target);
        self.update_floor(&target);
    }

    fn snapshot(&self) -> Vec<Position> {
        self.collector.lock().ordered_snapshot()
    }
}
