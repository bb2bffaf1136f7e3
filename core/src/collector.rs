use std::time::Duration;

/// One ranked entry of a top.
///
/// Values recorded through [`Top`](crate::Top) are latencies in
/// nanoseconds; [`Position::latency`] converts them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    value: u64,
    description: String,
}

impl Position {
    pub fn new(value: u64, description: impl Into<String>) -> Self {
        Self {
            value,
            description: description.into(),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.value)
    }
}

/// Bounded collection of the largest values seen, strictly descending.
///
/// At most one position is kept per value: the first one recorded wins and
/// later positions with an equal value are rejected as non-improving. Once
/// full, a new value must beat the current minimum, which it then evicts.
///
/// ```rust
/// use rolling_metrics::PositionCollector;
///
/// let mut collector = PositionCollector::new(2);
/// collector.add(10, || "first".to_string());
/// collector.add(20, || "second".to_string());
/// collector.add(30, || "third".to_string());
///
/// let values: Vec<u64> = collector.positions().iter().map(|p| p.value()).collect();
/// assert_eq!(values, vec![30, 20]);
/// ```
#[derive(Debug, Clone)]
pub struct PositionCollector {
    capacity: usize,
    positions: Vec<Position>,
}

impl PositionCollector {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "collector capacity must be positive");

        Self {
            capacity,
            positions: Vec::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.positions.len() >= self.capacity
    }

    /// Smallest value held, if any.
    pub fn min_value(&self) -> Option<u64> {
        self.positions.last().map(Position::value)
    }

    /// Whether `value` would be discarded for being too small.
    ///
    /// A `false` answer does not guarantee insertion: an equal value may
    /// already be held.
    #[inline]
    pub fn rejects(&self, value: u64) -> bool {
        self.is_full() && self.min_value().is_some_and(|min| value <= min)
    }

    /// Offers a position. `description` runs only when the value is inserted.
    ///
    /// Returns `true` if the ranking changed.
    pub fn add(&mut self, value: u64, description: impl FnOnce() -> String) -> bool {
        if self.rejects(value) {
            return false;
        }

        // Descending order: entries greater than `value` sort first.
        let index = match self
            .positions
            .binary_search_by(|position| value.cmp(&position.value))
        {
            Ok(_) => return false,
            Err(index) => index,
        };

        self.positions.insert(
            index,
            Position {
                value,
                description: description(),
            },
        );
        self.positions.truncate(self.capacity);
        true
    }

    /// Offers every position of `self` to `target`, largest first.
    ///
    /// Stops as soon as `target` is full and the next value cannot beat its
    /// minimum, since every later value is smaller still.
    pub fn add_into(&self, target: &mut PositionCollector) {
        for position in &self.positions {
            if target.rejects(position.value) {
                break;
            }
            target.add(position.value, || position.description.clone());
        }
    }

    pub fn reset(&mut self) {
        self.positions.clear();
    }

    /// Positions in descending order of value.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn ordered_snapshot(&self) -> Vec<Position> {
        self.positions.clone()
    }
}
