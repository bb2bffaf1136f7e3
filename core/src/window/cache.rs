use std::time::Duration;

use crate::clock::millis;

/// The last computed snapshot and the time it was computed at.
///
/// A zero time-to-live disables caching altogether.
#[derive(Debug)]
pub(crate) struct SnapshotCache<S> {
    ttl_ms: u64,
    entry: Option<(u64, S)>,
}

impl<S: Clone> SnapshotCache<S> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: millis(ttl),
            entry: None,
        }
    }

    pub(crate) fn get(&self, now: u64) -> Option<S> {
        match &self.entry {
            Some((computed_at, snapshot)) if now < computed_at.saturating_add(self.ttl_ms) => {
                Some(snapshot.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn put(&mut self, now: u64, snapshot: &S) {
        if self.ttl_ms > 0 {
            self.entry = Some((now, snapshot.clone()));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entry = None;
    }
}
