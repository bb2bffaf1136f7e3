/// The capability set shared by every aggregate the rolling machinery can
/// drive: histograms, top-K rankings and hit-ratio counters.
///
/// Aggregates use interior mutability so that writers can mutate the active
/// instance through a shared reference. Updates are not part of the trait
/// because their shape differs per aggregate; writers reach the concrete type
/// through [`PhasedRecorder::record`](crate::recorder::PhasedRecorder::record).
///
/// `reset` is only called on instances that no writer can reach. The source
/// of `merge_from` and the receiver of `snapshot` may be the active instance,
/// read while writers keep updating it.
pub trait Aggregate: Send + Sync + Sized {
    type Snapshot: Clone + Send + Sync + std::fmt::Debug;

    /// A fresh, empty instance with the same configuration.
    fn create_empty_copy(&self) -> Self;

    fn reset(&self);

    /// Folds `other` into `self`. `other` is left untouched.
    fn merge_from(&self, other: &Self);

    fn snapshot(&self) -> Self::Snapshot;
}
