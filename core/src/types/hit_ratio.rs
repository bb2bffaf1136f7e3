use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::clock::{Clock, SystemClock, millis};
use crate::config::{HitRatioConfig, ResetPolicy, Validate};
use crate::error::Result;
use crate::window::{ChunkRing, RollingWindow, SnapshotCache};

/// Low 32 bits of a packed counter hold the total, high 32 bits the hits.
const TOTAL_MASK: u64 = u32::MAX as u64;

/// Ratio of hits to requests, for caches and similar lookups.
///
/// ## Overview
///
/// Each update adds a number of hits and a number of requests. The reported
/// ratio is `hits / total` over the configured window, and `0.0` when the
/// window holds no requests.
///
/// Hits and totals share one atomic word, so an update is a single
/// compare-and-swap. When a count would outgrow 32 bits both counts are
/// halved, which keeps the ratio while giving older updates less weight.
///
/// ## Smoothly Decaying Window
///
/// With [`ResetPolicy::SmoothlyDecaying`] the window is split into chunks
/// and one spare chunk. A chunk contributes its counts multiplied by the
/// fraction of its interval that still lies inside the last `window`, so
/// the oldest chunk fades out linearly instead of vanishing at once.
///
/// ## Example Usage
///
/// ```rust
/// use rolling_metrics::{HitRatio, HitRatioConfig};
///
/// let ratio = HitRatio::new(&HitRatioConfig::default()).unwrap();
/// assert_eq!(ratio.hit_ratio(), 0.0);
///
/// ratio.update(3, 4);
/// assert_eq!(ratio.hit_ratio(), 0.75);
/// ```
#[derive(Debug)]
pub struct HitRatio {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Windowed(RollingWindow<RatioCounter>),
    Decaying(DecayingRatio),
}

impl HitRatio {
    pub fn new(config: &HitRatioConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &HitRatioConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let inner = match config.reset {
            ResetPolicy::SmoothlyDecaying { window, chunks } => {
                let chunk_ms = millis(window / chunks as u32);
                Inner::Decaying(DecayingRatio::new(clock, chunks, chunk_ms, config))
            }
            policy => Inner::Windowed(RollingWindow::new(
                RatioCounter::default(),
                &policy,
                clock,
                config.snapshot_caching,
            )?),
        };

        debug!(policy = config.reset.name(), "Created hit ratio");

        Ok(Self { inner })
    }

    /// Adds `hits` out of `total` requests. Hits above `total` count as
    /// `total`.
    #[inline]
    pub fn update(&self, hits: u32, total: u32) {
        let hits = hits.min(total);
        if total == 0 {
            return;
        }

        match &self.inner {
            Inner::Windowed(window) => window.record(|counter| counter.add(hits, total)),
            Inner::Decaying(decaying) => decaying.record(hits, total),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        match &self.inner {
            Inner::Windowed(window) => window.snapshot().ratio(),
            Inner::Decaying(decaying) => decaying.ratio(),
        }
    }

    pub fn reset(&self) {
        match &self.inner {
            Inner::Windowed(window) => window.reset(),
            Inner::Decaying(decaying) => decaying.reset(),
        }
        debug!("Reset hit ratio");
    }
}

/// Hits and total requests read from a [`RatioCounter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RatioCounts {
    pub(crate) hits: u64,
    pub(crate) total: u64,
}

impl RatioCounts {
    fn unpack(word: u64) -> Self {
        Self {
            hits: word >> 32,
            total: word & TOTAL_MASK,
        }
    }

    /// Sum of two counts, halved until the total fits in 32 bits.
    fn combine(self, hits: u64, total: u64) -> u64 {
        let mut hits = self.hits + hits;
        let mut total = self.total + total;
        while total > TOTAL_MASK {
            hits /= 2;
            total /= 2;
        }
        (hits << 32) | total
    }

    pub(crate) fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RatioCounter {
    packed: AtomicU64,
}

impl RatioCounter {
    #[inline]
    pub(crate) fn add(&self, hits: u32, total: u32) {
        self.add_counts(u64::from(hits), u64::from(total));
    }

    fn add_counts(&self, hits: u64, total: u64) {
        let mut current = self.packed.load(Ordering::Relaxed);
        loop {
            let next = RatioCounts::unpack(current).combine(hits, total);
            match self.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Aggregate for RatioCounter {
    type Snapshot = RatioCounts;

    fn create_empty_copy(&self) -> Self {
        Self::default()
    }

    fn reset(&self) {
        self.packed.store(0, Ordering::Relaxed);
    }

    fn merge_from(&self, other: &Self) {
        let counts = other.snapshot();
        if counts.total > 0 {
            self.add_counts(counts.hits, counts.total);
        }
    }

    fn snapshot(&self) -> RatioCounts {
        RatioCounts::unpack(self.packed.load(Ordering::Acquire))
    }
}

/// Chunked ratio whose oldest chunk fades out linearly.
#[derive(Debug)]
struct DecayingRatio {
    clock: Arc<dyn Clock>,
    ring: ChunkRing<RatioCounter>,
    window_ms: u64,
    cache: Mutex<SnapshotCache<f64>>,
}

impl DecayingRatio {
    fn new(clock: Arc<dyn Clock>, chunks: usize, chunk_ms: u64, config: &HitRatioConfig) -> Self {
        let origin = clock.now_millis();

        Self {
            ring: ChunkRing::new(&RatioCounter::default(), chunks + 1, chunk_ms, origin),
            window_ms: chunk_ms.saturating_mul(chunks as u64),
            cache: Mutex::new(SnapshotCache::new(config.snapshot_caching)),
            clock,
        }
    }

    #[inline]
    fn record(&self, hits: u32, total: u32) {
        self.ring
            .record(self.clock.now_millis(), |counter| counter.add(hits, total));
    }

    fn ratio(&self) -> f64 {
        let now = self.clock.now_millis();
        let mut cache = self.cache.lock();

        if let Some(ratio) = cache.get(now) {
            return ratio;
        }

        let current = self.ring.interval_at(now);
        let window_start = now.saturating_sub(self.window_ms);
        let chunk_ms = self.ring.chunk_ms() as f64;

        let (mut hits, mut total) = (0.0, 0.0);
        self.ring.visit(now, |interval, counter| {
            let expires_at = self.ring.interval_start(interval + 1);
            let weight = if interval == current {
                1.0
            } else if interval > current || expires_at <= window_start {
                return;
            } else {
                ((expires_at - window_start) as f64 / chunk_ms).min(1.0)
            };

            let counts = counter.snapshot();
            hits += weight * counts.hits as f64;
            total += weight * counts.total as f64;
        });

        let ratio = if total > 0.0 { hits / total } else { 0.0 };
        cache.put(now, &ratio);
        ratio
    }

    fn reset(&self) {
        let mut cache = self.cache.lock();
        self.ring.reset();
        cache.clear();
    }
}
