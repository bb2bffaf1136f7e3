use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aggregate::Aggregate;
use crate::phaser::{ReaderGuard, WriterReaderPhaser};

/// Double-buffered holder for one aggregate.
///
/// Writers mutate the active instance inside a phaser critical section and
/// never wait for readers. A reader swaps the active and inactive instances,
/// waits for writers still working on the retired one, and then owns it
/// exclusively until the next swap.
///
/// Both instances are allocated once, at construction. An instance is reset
/// right before it becomes active again, so a sample stays readable until the
/// following swap.
///
/// ```text
///  writers ──► slots[active]          reader ──► slots[active ^ 1]
///                   ▲                                  │
///                   └────────── swap + flip_phase ─────┘
/// ```
#[derive(Debug)]
pub struct PhasedRecorder<A> {
    phaser: WriterReaderPhaser,
    slots: [A; 2],
    active: AtomicUsize,
}

impl<A: Aggregate> PhasedRecorder<A> {
    pub fn new(prototype: A) -> Self {
        let inactive = prototype.create_empty_copy();

        Self {
            phaser: WriterReaderPhaser::new(),
            slots: [prototype, inactive],
            active: AtomicUsize::new(0),
        }
    }

    /// Runs `update` against the active instance.
    #[inline]
    pub fn record<R>(&self, update: impl FnOnce(&A) -> R) -> R {
        let _writer = self.phaser.writer_enter();
        update(&self.slots[self.active.load(Ordering::SeqCst)])
    }

    /// Retires the active instance and hands it to `read`.
    ///
    /// The instance passed to `read` holds every update that completed before
    /// this call and none that started after it returned.
    pub fn sample<R>(&self, read: impl FnOnce(&A) -> R) -> R {
        let reader = self.phaser.reader_lock();
        let retired = self.flip(&reader);
        read(&self.slots[retired])
    }

    /// Samples into a caller-owned instance instead of allocating one.
    ///
    /// `target` is cleared first, so after the call it holds exactly the
    /// updates recorded since the previous sample.
    pub fn sample_into(&self, target: &A) {
        target.reset();
        self.sample(|retired| target.merge_from(retired));
    }

    /// Discards everything recorded so far.
    ///
    /// Each flip clears the instance it activates, so two flips in a row
    /// leave both instances empty of anything recorded before the call.
    pub fn reset(&self) {
        let reader = self.phaser.reader_lock();
        self.flip(&reader);
        self.flip(&reader);
    }

    fn flip(&self, reader: &ReaderGuard<'_>) -> usize {
        let retiring = self.active.load(Ordering::SeqCst);
        let next = retiring ^ 1;

        self.slots[next].reset();
        self.active.store(next, Ordering::SeqCst);
        self.phaser.flip_phase(reader);

        retiring
    }
}
