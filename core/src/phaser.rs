//! Writer/reader phase handoff.
//!
//! Writers bracket each mutation with [`WriterReaderPhaser::writer_enter`],
//! which costs one `fetch_add` on the way in and one on the way out. A single
//! reader at a time (serialized by the reader lock) calls
//! [`WriterReaderPhaser::flip_phase`] after swapping the structure writers
//! mutate, and returns only once every writer that entered before the flip
//! has left its critical section.
//!
//! ## Protocol
//!
//! - `start_epoch` counts writer entries. Its sign bit selects the phase:
//!   even phases count up from `0`, odd phases from `i64::MIN`.
//! - A writer leaving its critical section increments the end counter that
//!   matches the sign of the value it got on entry.
//! - Flipping resets the next phase's end counter, swaps `start_epoch` to the
//!   next phase's initial value and waits until the previous phase's end
//!   counter equals the entry count captured by the swap.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

/// Spin iterations before a waiting reader starts yielding its time slice.
const SPINS_BEFORE_YIELD: u32 = 128;

#[derive(Debug)]
pub(crate) struct WriterReaderPhaser {
    start_epoch: AtomicI64,
    even_end_epoch: AtomicI64,
    odd_end_epoch: AtomicI64,
    reader_lock: Mutex<()>,
}

/// Marks a writer as inside its critical section until dropped.
#[must_use]
pub(crate) struct WriterGuard<'a> {
    phaser: &'a WriterReaderPhaser,
    critical_value: i64,
}

/// Proof that the holder is the only reader of a phaser.
#[must_use]
pub(crate) struct ReaderGuard<'a> {
    phaser: &'a WriterReaderPhaser,
    _lock: MutexGuard<'a, ()>,
}

impl WriterReaderPhaser {
    pub(crate) fn new() -> Self {
        Self {
            start_epoch: AtomicI64::new(0),
            even_end_epoch: AtomicI64::new(0),
            odd_end_epoch: AtomicI64::new(i64::MIN),
            reader_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn writer_enter(&self) -> WriterGuard<'_> {
        WriterGuard {
            phaser: self,
            critical_value: self.start_epoch.fetch_add(1, Ordering::SeqCst),
        }
    }

    #[inline]
    fn writer_exit(&self, critical_value: i64) {
        let end_epoch = if critical_value < 0 {
            &self.odd_end_epoch
        } else {
            &self.even_end_epoch
        };
        end_epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn reader_lock(&self) -> ReaderGuard<'_> {
        ReaderGuard {
            phaser: self,
            _lock: self.reader_lock.lock(),
        }
    }

    /// Starts a new phase and waits for writers of the previous one.
    ///
    /// Any structure swapped before this call is free of writers once it
    /// returns. The wait is bounded by the longest in-flight writer.
    pub(crate) fn flip_phase(&self, reader: &ReaderGuard<'_>) {
        debug_assert!(std::ptr::eq(reader.phaser, self));

        let next_phase_is_even = self.start_epoch.load(Ordering::SeqCst) < 0;
        let initial_start_value = if next_phase_is_even { 0 } else { i64::MIN };

        if next_phase_is_even {
            self.even_end_epoch.store(initial_start_value, Ordering::SeqCst);
        } else {
            self.odd_end_epoch.store(initial_start_value, Ordering::SeqCst);
        }

        let start_value_at_flip = self.start_epoch.swap(initial_start_value, Ordering::SeqCst);
        let previous_end_epoch = if next_phase_is_even {
            &self.odd_end_epoch
        } else {
            &self.even_end_epoch
        };

        let mut backoff = Backoff::default();
        while previous_end_epoch.load(Ordering::SeqCst) != start_value_at_flip {
            backoff.snooze();
        }

        if backoff.spins > 0 {
            trace!(spins = backoff.spins, "Phase flip waited for in-flight writers");
        }
    }
}

/// Spin-then-yield wait used while another thread finishes a short critical
/// section.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    spins: u32,
}

impl Backoff {
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.spins < SPINS_BEFORE_YIELD {
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
        self.spins = self.spins.saturating_add(1);
    }
}

impl Drop for WriterGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.phaser.writer_exit(self.critical_value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_flip_without_writers_returns_immediately() {
        let phaser = WriterReaderPhaser::new();
        let reader = phaser.reader_lock();

        for _ in 0..4 {
            phaser.flip_phase(&reader);
        }
    }

    #[test]
    fn test_completed_writers_do_not_block_flip() {
        let phaser = WriterReaderPhaser::new();

        for _ in 0..10 {
            let _guard = phaser.writer_enter();
        }

        let reader = phaser.reader_lock();
        phaser.flip_phase(&reader);
        drop(phaser.writer_enter());
        phaser.flip_phase(&reader);
    }

    #[test]
    fn test_flip_waits_for_writer_in_previous_phase() {
        let phaser = Arc::new(WriterReaderPhaser::new());
        let released = Arc::new(AtomicBool::new(false));

        let guard = phaser.writer_enter();

        let flipper = {
            let phaser = phaser.clone();
            let released = released.clone();
            thread::spawn(move || {
                let reader = phaser.reader_lock();
                phaser.flip_phase(&reader);
                released.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(guard);

        assert!(flipper.join().unwrap(), "flip returned before the writer left");
    }
}
