//! Millisecond time sources.
//!
//! Every windowed metric reads time through a [`Clock`], so tests can drive
//! chunk rotation deterministically with a [`MockClock`].

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock milliseconds.
///
/// Implementations are expected to be monotonic-non-decreasing under normal
/// operation. Metrics tolerate a clock that moves backwards: a late write
/// lands in whichever chunk currently occupies its slot.
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        millis(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        )
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A manually driven clock for tests.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// metric and keep another to move time forward.
///
/// ```rust
/// use rolling_metrics::{Clock, MockClock};
///
/// let clock = MockClock::new(0);
/// let shared = clock.clone();
///
/// clock.advance(1500);
/// assert_eq!(shared.now_millis(), 1500);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MockClock {
    millis: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "background-clock")]
pub use background::BackgroundClock;

#[cfg(feature = "background-clock")]
mod background {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use tokio::task::JoinHandle;
    use tracing::debug;

    use super::{Clock, SystemClock, millis};

    /// A clock whose value is refreshed by a background tokio task.
    ///
    /// Reading it costs one relaxed atomic load, which keeps the system call
    /// off the write path of hot metrics. The price is staleness of up to
    /// `precision`. The refresh task is aborted when the clock is dropped.
    #[derive(Debug)]
    pub struct BackgroundClock {
        millis: Arc<AtomicU64>,
        task: Option<JoinHandle<()>>,
    }

    impl BackgroundClock {
        /// Starts the refresh task on the current tokio runtime.
        ///
        /// # Panics
        ///
        /// Panics when called outside of a tokio runtime.
        pub fn start(precision: Duration) -> Self {
            let millis = Arc::new(AtomicU64::new(SystemClock.now_millis()));
            let task = Self::spawn(precision, millis.clone());

            debug!(precision_ms = millis(precision), "Started background clock");

            Self {
                millis,
                task: Some(task),
            }
        }

        fn spawn(precision: Duration, millis: Arc<AtomicU64>) -> JoinHandle<()> {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(precision);

                loop {
                    ticker.tick().await;
                    millis.store(SystemClock.now_millis(), Ordering::Relaxed);
                }
            })
        }
    }

    impl Clock for BackgroundClock {
        fn now_millis(&self) -> u64 {
            self.millis.load(Ordering::Relaxed)
        }
    }

    impl Drop for BackgroundClock {
        fn drop(&mut self) {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}
