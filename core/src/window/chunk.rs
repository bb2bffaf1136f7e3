use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::aggregate::Aggregate;
use crate::phaser::Backoff;
use crate::recorder::PhasedRecorder;

/// Marks a chunk whose interval is being replaced.
const ROTATING: u64 = u64::MAX;

/// Latest deadline a chunk can carry. Deadlines saturate here so they never
/// collide with [`ROTATING`].
pub(crate) const MAX_DEADLINE: u64 = ROTATING - 1;

/// One interval's worth of recorded data plus the time that interval ends.
///
/// The active instance of the recorder always holds the interval named by
/// `expires_at`. A writer that finds the deadline passed swaps `ROTATING` in
/// and retires the active instance with a phase flip; the expired data stays
/// in the retired instance and is cleared before that instance is activated
/// again. Writers of the new interval that arrive mid-rotation wait for the
/// flip to finish, so every update they complete lands in the new instance.
#[derive(Debug)]
pub(crate) struct Chunk<A> {
    recorder: PhasedRecorder<A>,
    expires_at: AtomicU64,
}

impl<A: Aggregate> Chunk<A> {
    pub(crate) fn new(prototype: &A, expires_at: u64) -> Self {
        Self {
            recorder: PhasedRecorder::new(prototype.create_empty_copy()),
            expires_at: AtomicU64::new(expires_at.min(MAX_DEADLINE)),
        }
    }

    #[inline]
    pub(crate) fn record<R>(
        &self,
        now: u64,
        next_expiry: impl Fn() -> u64,
        update: impl FnOnce(&A) -> R,
    ) -> R {
        let mut backoff = Backoff::default();
        loop {
            let expires_at = self.expires_at.load(Ordering::SeqCst);
            if expires_at == ROTATING {
                backoff.snooze();
            } else if now < expires_at || self.try_rotate(expires_at, now, &next_expiry) {
                break;
            }
        }

        self.recorder.record(update)
    }

    /// Moves the chunk to a new interval once `now` reaches its deadline.
    ///
    /// Returns `true` for the single caller that performed the rotation. A
    /// rotation already in progress is left to its owner.
    pub(crate) fn rotate_if_expired(&self, now: u64, next_expiry: impl Fn() -> u64) -> bool {
        loop {
            let expires_at = self.expires_at.load(Ordering::SeqCst);
            if expires_at == ROTATING || now < expires_at {
                return false;
            }
            if self.try_rotate(expires_at, now, &next_expiry) {
                return true;
            }
        }
    }

    fn try_rotate(&self, expired_at: u64, now: u64, next_expiry: &impl Fn() -> u64) -> bool {
        if self
            .expires_at
            .compare_exchange(expired_at, ROTATING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let next = next_expiry().min(MAX_DEADLINE);
        self.recorder
            .sample(|_expired| self.expires_at.store(next, Ordering::SeqCst));

        trace!(expired_at, expires_at = next, now, "Rotated chunk");
        true
    }

    /// Runs `read` against the live data of the chunk together with the
    /// deadline of the interval it belongs to.
    ///
    /// Returns `None` while a rotation is in progress: the active instance
    /// then still holds the expired interval.
    pub(crate) fn read<R>(&self, read: impl FnOnce(u64, &A) -> R) -> Option<R> {
        self.recorder.record(|active| {
            let expires_at = self.expires_at.load(Ordering::SeqCst);
            (expires_at != ROTATING).then(|| read(expires_at, active))
        })
    }

    pub(crate) fn reset(&self) {
        self.recorder.reset();
    }
}

/// A ring of chunks covering consecutive, equally sized intervals.
///
/// Interval `n` spans `[origin + n * chunk_ms, origin + (n + 1) * chunk_ms)`
/// and lives in slot `n % len`. A slot whose deadline has passed holds an
/// interval at least one full ring old, so the first writer of the new
/// interval rotates it; after a long pause the slot jumps straight to the
/// current interval.
#[derive(Debug)]
pub(crate) struct ChunkRing<A> {
    chunks: Box<[Chunk<A>]>,
    origin: u64,
    chunk_ms: u64,
}

impl<A: Aggregate> ChunkRing<A> {
    pub(crate) fn new(prototype: &A, len: usize, chunk_ms: u64, origin: u64) -> Self {
        let mut ring = Self {
            chunks: Box::default(),
            origin,
            chunk_ms: chunk_ms.max(1),
        };
        ring.chunks = (0..len as u64)
            .map(|interval| Chunk::new(prototype, ring.interval_start(interval + 1)))
            .collect();
        ring
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) fn chunk_ms(&self) -> u64 {
        self.chunk_ms
    }

    /// Index of the interval containing `now`.
    pub(crate) fn interval_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.origin) / self.chunk_ms
    }

    /// Index of the interval that ends at `expires_at`.
    pub(crate) fn interval_ending_at(&self, expires_at: u64) -> u64 {
        (expires_at.saturating_sub(self.origin) / self.chunk_ms).saturating_sub(1)
    }

    pub(crate) fn interval_start(&self, interval: u64) -> u64 {
        interval
            .saturating_mul(self.chunk_ms)
            .saturating_add(self.origin)
            .min(MAX_DEADLINE)
    }

    fn slot(&self, interval: u64) -> &Chunk<A> {
        &self.chunks[(interval % self.chunks.len() as u64) as usize]
    }

    #[inline]
    pub(crate) fn record<R>(&self, now: u64, update: impl FnOnce(&A) -> R) -> R {
        let interval = self.interval_at(now);
        self.slot(interval)
            .record(now, || self.interval_start(interval + 1), update)
    }

    /// Rotates the slot of the current interval if needed, then hands the
    /// live data of every chunk to `visit` along with its interval index.
    pub(crate) fn visit(&self, now: u64, mut visit: impl FnMut(u64, &A)) {
        let interval = self.interval_at(now);
        self.slot(interval)
            .rotate_if_expired(now, || self.interval_start(interval + 1));

        for chunk in self.chunks.iter() {
            chunk.read(|expires_at, data| visit(self.interval_ending_at(expires_at), data));
        }
    }

    pub(crate) fn reset(&self) {
        for chunk in self.chunks.iter() {
            chunk.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::recorder::tests::Sum;

    fn ring(len: usize) -> ChunkRing<Sum> {
        ChunkRing::new(&Sum::default(), len, 1000, 0)
    }

    /// `(interval, total)` of every chunk, in slot order.
    fn totals(ring: &ChunkRing<Sum>, now: u64) -> Vec<(u64, u64)> {
        let mut totals = Vec::new();
        ring.visit(now, |interval, sum| totals.push((interval, sum.snapshot())));
        totals
    }

    /// Counts like [`Sum`] but takes its time to clear, which keeps a rotation
    /// open long enough for other threads to run into it.
    #[derive(Debug, Default)]
    struct SlowReset(Sum);

    impl Aggregate for SlowReset {
        type Snapshot = u64;

        fn create_empty_copy(&self) -> Self {
            Self::default()
        }

        fn reset(&self) {
            thread::sleep(Duration::from_millis(50));
            self.0.reset();
        }

        fn merge_from(&self, other: &Self) {
            self.0.merge_from(&other.0);
        }

        fn snapshot(&self) -> u64 {
            self.0.snapshot()
        }
    }

    #[test]
    fn test_records_into_slot_of_current_interval() {
        let ring = ring(3);

        ring.record(0, |sum| sum.add(1));
        ring.record(1500, |sum| sum.add(2));
        ring.record(2999, |sum| sum.add(4));

        assert_eq!(totals(&ring, 2999), vec![(0, 1), (1, 2), (2, 4)]);
    }

    #[test]
    fn test_writer_rotates_expired_slot() {
        let ring = ring(2);

        ring.record(100, |sum| sum.add(5));
        assert_eq!(totals(&ring, 100), vec![(0, 5), (1, 0)]);

        // Interval 2 reuses slot 0.
        ring.record(2100, |sum| sum.add(7));
        assert_eq!(totals(&ring, 2100), vec![(2, 7), (1, 0)]);
    }

    #[test]
    fn test_reader_rotates_current_slot() {
        let ring = ring(2);

        ring.record(100, |sum| sum.add(5));
        assert_eq!(totals(&ring, 2500), vec![(2, 0), (1, 0)]);
    }

    #[test]
    fn test_long_pause_jumps_to_current_interval() {
        let ring = ring(3);

        ring.record(0, |sum| sum.add(1));

        // Slot 1 holds interval 10 now; the others still describe 0 and 2.
        assert_eq!(ring.interval_at(10_500), 10);
        assert_eq!(totals(&ring, 10_500), vec![(0, 1), (10, 0), (2, 0)]);
    }

    #[test]
    fn test_rotation_is_performed_once() {
        let chunk = Chunk::new(&Sum::default(), 1000);

        assert!(!chunk.rotate_if_expired(999, || 2000));
        assert!(chunk.rotate_if_expired(1000, || 2000));
        assert!(!chunk.rotate_if_expired(1000, || 3000));
        assert_eq!(chunk.read(|expires_at, _| expires_at), Some(2000));
    }

    #[test]
    fn test_rotation_keeps_updates_of_new_interval() {
        let chunk = Arc::new(Chunk::new(&SlowReset::default(), 1000));
        chunk.record(500, || 1000, |slow| slow.0.add(100));

        let rotator = {
            let chunk = chunk.clone();
            thread::spawn(move || chunk.record(1000, || 2000, |slow| slow.0.add(1)))
        };

        while chunk.expires_at.load(Ordering::SeqCst) != ROTATING {
            thread::yield_now();
        }
        chunk.record(1000, || 2000, |slow| slow.0.add(5));
        rotator.join().unwrap();

        assert_eq!(
            chunk.read(|expires_at, slow| (expires_at, slow.snapshot())),
            Some((2000, 6))
        );
    }

    #[test]
    fn test_concurrent_rotations_lose_nothing() {
        const WRITERS: u64 = 4;
        const UPDATES: u64 = 10_000;

        let ring = Arc::new(ring(2));
        let started = Arc::new(AtomicBool::new(false));

        // Every writer records at t=2000, so all of them race to rotate
        // slot 0 away from interval 0.
        ring.record(0, |sum| sum.add(1_000_000));

        let writers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let ring = ring.clone();
                let started = started.clone();
                thread::spawn(move || {
                    while !started.load(Ordering::SeqCst) {
                        std::hint::spin_loop();
                    }
                    for _ in 0..UPDATES {
                        ring.record(2000, |sum| sum.add(1));
                    }
                })
            })
            .collect();

        started.store(true, Ordering::SeqCst);
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(totals(&ring, 2000), vec![(2, WRITERS * UPDATES), (1, 0)]);
    }

    #[test]
    fn test_deadlines_saturate_below_rotation_marker() {
        let ring = ChunkRing::new(&Sum::default(), 2, u64::MAX / 2 + 1, 0);

        ring.record(0, |sum| sum.add(3));

        assert_eq!(ring.interval_start(2), MAX_DEADLINE);
        assert_eq!(totals(&ring, 0), vec![(0, 3), (0, 0)]);
    }

    #[test]
    fn test_reset_clears_chunks() {
        let ring = ring(2);

        ring.record(0, |sum| sum.add(3));
        ring.record(1000, |sum| sum.add(3));
        ring.reset();

        assert_eq!(totals(&ring, 1000), vec![(0, 0), (1, 0)]);
    }
}
