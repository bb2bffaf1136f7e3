//! Reset policies shared by every windowed metric.
//!
//! A [`RollingWindow`] owns the recorders of one metric and decides, on each
//! read, which recorded data is still part of the window. Writers only touch
//! atomics and the active aggregate. Reads are mutually exclusive through the
//! reader mutex and see the live aggregates of every interval they merge, so
//! a writer's view of the current interval and the reader's agree.

mod cache;
mod chunk;

pub(crate) use cache::SnapshotCache;
pub(crate) use chunk::ChunkRing;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::aggregate::Aggregate;
use crate::clock::{Clock, millis};
use crate::config::ResetPolicy;
use crate::error::{ConfigError, Result};
use crate::recorder::PhasedRecorder;
use chunk::Chunk;

#[derive(Debug)]
enum Strategy<A> {
    /// Read in place; only an explicit reset clears it.
    Never(PhasedRecorder<A>),
    OnSnapshot(PhasedRecorder<A>),
    /// A single chunk whose deadline moves `period_ms` past the moment it
    /// fired.
    Periodic { chunk: Chunk<A>, period_ms: u64 },
    Chunked {
        ring: ChunkRing<A>,
        include_current: bool,
    },
}

#[derive(Debug)]
struct ReaderState<A: Aggregate> {
    merged: A,
    cache: SnapshotCache<A::Snapshot>,
}

#[derive(Debug)]
pub(crate) struct RollingWindow<A: Aggregate> {
    clock: Arc<dyn Clock>,
    strategy: Strategy<A>,
    reader: Mutex<ReaderState<A>>,
}

impl<A: Aggregate> RollingWindow<A> {
    /// Builds the recorders for `policy`. The policy must already be valid.
    pub(crate) fn new(
        prototype: A,
        policy: &ResetPolicy,
        clock: Arc<dyn Clock>,
        caching: Duration,
    ) -> Result<Self> {
        let now = clock.now_millis();
        let merged = prototype.create_empty_copy();

        let strategy = match *policy {
            ResetPolicy::Never => Strategy::Never(PhasedRecorder::new(prototype)),
            ResetPolicy::OnSnapshot => Strategy::OnSnapshot(PhasedRecorder::new(prototype)),
            ResetPolicy::Periodically { period } => {
                let period_ms = millis(period);
                Strategy::Periodic {
                    chunk: Chunk::new(&prototype, now.saturating_add(period_ms)),
                    period_ms,
                }
            }
            ResetPolicy::ByChunks {
                window,
                chunks,
                include_current_chunk,
            } => {
                let chunk_ms = millis(window / chunks as u32);
                Strategy::Chunked {
                    ring: ChunkRing::new(&prototype, chunks, chunk_ms, now),
                    include_current: include_current_chunk,
                }
            }
            ResetPolicy::SmoothlyDecaying { .. } => {
                return Err(ConfigError::UnsupportedPolicy {
                    policy: policy.name(),
                    metric: "rolling windows",
                });
            }
        };

        Ok(Self {
            clock,
            strategy,
            reader: Mutex::new(ReaderState {
                merged,
                cache: SnapshotCache::new(caching),
            }),
        })
    }

    #[inline]
    pub(crate) fn record<R>(&self, update: impl FnOnce(&A) -> R) -> R {
        match &self.strategy {
            Strategy::Never(recorder) | Strategy::OnSnapshot(recorder) => recorder.record(update),
            Strategy::Periodic { chunk, period_ms } => {
                let now = self.clock.now_millis();
                chunk.record(now, || now.saturating_add(*period_ms), update)
            }
            Strategy::Chunked { ring, .. } => ring.record(self.clock.now_millis(), update),
        }
    }

    /// Everything currently inside the window, possibly served from cache.
    pub(crate) fn snapshot(&self) -> A::Snapshot {
        let now = self.clock.now_millis();
        let mut reader = self.reader.lock();

        if let Some(snapshot) = reader.cache.get(now) {
            return snapshot;
        }

        let snapshot = self.compute(now, &reader);
        reader.cache.put(now, &snapshot);
        snapshot
    }

    fn compute(&self, now: u64, reader: &ReaderState<A>) -> A::Snapshot {
        let merged = &reader.merged;

        match &self.strategy {
            Strategy::Never(recorder) => recorder.record(A::snapshot),
            Strategy::OnSnapshot(recorder) => recorder.sample(A::snapshot),
            Strategy::Periodic { chunk, period_ms } => {
                chunk.rotate_if_expired(now, || now.saturating_add(*period_ms));
                merged.reset();
                chunk.read(|_, data| merged.merge_from(data));
                merged.snapshot()
            }
            Strategy::Chunked {
                ring,
                include_current,
            } => {
                let current = ring.interval_at(now);
                let oldest = (current + 1).saturating_sub(ring.len() as u64);

                merged.reset();
                ring.visit(now, |interval, data| {
                    let visible = if *include_current {
                        interval >= oldest && interval <= current
                    } else {
                        interval >= oldest && interval < current
                    };
                    if visible {
                        merged.merge_from(data);
                    }
                });
                merged.snapshot()
            }
        }
    }

    /// Discards all recorded data and the cached snapshot.
    pub(crate) fn reset(&self) {
        let mut reader = self.reader.lock();

        match &self.strategy {
            Strategy::Never(recorder) | Strategy::OnSnapshot(recorder) => recorder.reset(),
            Strategy::Periodic { chunk, .. } => chunk.reset(),
            Strategy::Chunked { ring, .. } => ring.reset(),
        }
        reader.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::recorder::tests::Sum;

    fn window(policy: ResetPolicy, clock: &MockClock) -> RollingWindow<Sum> {
        RollingWindow::new(
            Sum::default(),
            &policy,
            Arc::new(clock.clone()),
            Duration::ZERO,
        )
        .unwrap()
    }

    fn chunked(include_current_chunk: bool) -> ResetPolicy {
        ResetPolicy::ByChunks {
            window: Duration::from_secs(3),
            chunks: 3,
            include_current_chunk,
        }
    }

    #[test]
    fn test_never_accumulates_across_snapshots() {
        let clock = MockClock::new(0);
        let window = window(ResetPolicy::Never, &clock);

        window.record(|sum| sum.add(2));
        assert_eq!(window.snapshot(), 2);
        window.record(|sum| sum.add(3));
        assert_eq!(window.snapshot(), 5);

        window.reset();
        assert_eq!(window.snapshot(), 0);
    }

    #[test]
    fn test_on_snapshot_starts_over_after_each_read() {
        let clock = MockClock::new(0);
        let window = window(ResetPolicy::OnSnapshot, &clock);

        window.record(|sum| sum.add(2));
        assert_eq!(window.snapshot(), 2);
        assert_eq!(window.snapshot(), 0);
    }

    #[test]
    fn test_periodic_deadline_moves_from_firing_time() {
        let clock = MockClock::new(0);
        let window = window(
            ResetPolicy::Periodically {
                period: Duration::from_secs(1),
            },
            &clock,
        );

        window.record(|sum| sum.add(1));
        clock.set(999);
        window.record(|sum| sum.add(1));
        assert_eq!(window.snapshot(), 2);

        clock.set(1500);
        window.record(|sum| sum.add(4));
        assert_eq!(window.snapshot(), 4);

        // Next deadline is 2500, not 2000.
        clock.set(2400);
        assert_eq!(window.snapshot(), 4);
        clock.set(2500);
        assert_eq!(window.snapshot(), 0);
    }

    #[test]
    fn test_chunked_window_drops_oldest_interval() {
        let clock = MockClock::new(0);
        let window = window(chunked(true), &clock);

        window.record(|sum| sum.add(1));
        clock.set(1000);
        window.record(|sum| sum.add(10));
        clock.set(2000);
        window.record(|sum| sum.add(100));
        assert_eq!(window.snapshot(), 111);

        clock.set(3000);
        assert_eq!(window.snapshot(), 110);

        clock.set(5999);
        assert_eq!(window.snapshot(), 0);
    }

    #[test]
    fn test_chunked_window_can_exclude_current_interval() {
        let clock = MockClock::new(0);
        let window = window(chunked(false), &clock);

        window.record(|sum| sum.add(1));
        assert_eq!(window.snapshot(), 0);

        clock.set(1000);
        window.record(|sum| sum.add(10));
        assert_eq!(window.snapshot(), 1);

        clock.set(2000);
        assert_eq!(window.snapshot(), 11);

        clock.set(3000);
        assert_eq!(window.snapshot(), 10);
    }

    #[test]
    fn test_cached_snapshot_is_served_until_expiry() {
        let clock = MockClock::new(0);
        let window = RollingWindow::new(
            Sum::default(),
            &ResetPolicy::Never,
            Arc::new(clock.clone()),
            Duration::from_millis(500),
        )
        .unwrap();

        window.record(|sum| sum.add(1));
        assert_eq!(window.snapshot(), 1);

        window.record(|sum| sum.add(1));
        clock.set(499);
        assert_eq!(window.snapshot(), 1);
        clock.set(500);
        assert_eq!(window.snapshot(), 2);

        window.record(|sum| sum.add(1));
        window.reset();
        assert_eq!(window.snapshot(), 0);
    }

    #[test]
    fn test_decaying_policy_is_rejected() {
        let result = RollingWindow::new(
            Sum::default(),
            &ResetPolicy::SmoothlyDecaying {
                window: Duration::from_secs(2),
                chunks: 2,
            },
            Arc::new(MockClock::new(0)),
            Duration::ZERO,
        );

        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedPolicy { .. })
        ));
    }
}
