//! Fixed-capacity ring buffer holding one series' recent history.
//!
//! Each series owns one [`RingBuffer`] sized to cover the display window.
//! Writes overwrite the oldest slot once the buffer is full, so memory per
//! series is bounded by configuration, not by how long the process runs.
//!
//! # Design
//!
//! - `values` is allocated once at full capacity and never resized
//! - `next` is the slot the next write lands in
//! - `total` counts every write ever made, saturating at `u64::MAX`
//!
//! The number of retained values is `min(total, capacity)`, and the oldest
//! of them sits `len` slots behind `next`.

use serde::{Deserialize, Serialize};

/// The retained history of one series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Samples {
    /// Retained values, oldest first. Never longer than the ring capacity.
    pub values: Vec<f64>,
    /// Total number of writes ever made to the series.
    pub total: u64,
}

impl Samples {
    /// Returns the newest retained value.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Returns `true` when writes have overwritten older values.
    pub fn has_wrapped(&self) -> bool {
        self.total > self.values.len() as u64
    }
}

/// A circular buffer of `f64` values with a write counter.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    values: Box<[f64]>,
    next: usize,
    total: u64,
}

impl RingBuffer {
    /// Creates an empty ring buffer.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of slots; must be non-zero, which the store
    ///   configuration guarantees
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use proq::ring::RingBuffer;
    ///
    /// let mut ring = RingBuffer::new(2);
    /// ring.push(1.0);
    /// ring.push(2.0);
    /// ring.push(3.0);
    ///
    /// let samples = ring.snapshot();
    /// assert_eq!(samples.values, vec![2.0, 3.0]);
    /// assert_eq!(samples.total, 3);
    /// ```
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            values: vec![0.0; capacity].into_boxed_slice(),
            next: 0,
            total: 0,
        }
    }

    /// Writes `value` at the cursor and advances it circularly.
    ///
    /// This is the hot path and performs no allocation.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.values[self.next] = value;
        self.next = (self.next + 1) % self.values.len();
        self.total = self.total.saturating_add(1);
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Returns the number of retained values.
    #[allow(clippy::cast_possible_truncation)] // bounded by capacity, which is a usize
    pub fn len(&self) -> usize {
        self.total.min(self.values.len() as u64) as usize
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns the total number of writes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Iterates retained values oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let cap = self.values.len();
        let len = self.len();
        let start = (self.next + cap - len) % cap;
        (0..len).map(move |i| self.values[(start + i) % cap])
    }

    /// Copies the retained values, oldest first, together with the total.
    pub fn snapshot(&self) -> Samples {
        Samples {
            values: self.iter().collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ring_is_empty() {
        let ring = RingBuffer::new(4);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.snapshot(), Samples::default());
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }

    #[test]
    fn test_partial_fill_returns_all_in_order() {
        let mut ring = RingBuffer::new(5);
        for v in [1.0, 2.0, 3.0] {
            ring.push(v);
        }
        let samples = ring.snapshot();
        assert_eq!(samples.values, vec![1.0, 2.0, 3.0]);
        assert_eq!(samples.total, 3);
        assert!(!samples.has_wrapped());
        assert_eq!(samples.last(), Some(3.0));
    }

    #[test]
    fn test_exact_fill() {
        let mut ring = RingBuffer::new(3);
        for v in [1.0, 2.0, 3.0] {
            ring.push(v);
        }
        assert_eq!(ring.snapshot().values, vec![1.0, 2.0, 3.0]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_wraparound_keeps_newest_in_order() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=8 {
            ring.push(f64::from(i));
        }
        let samples = ring.snapshot();
        assert_eq!(samples.values, vec![6.0, 7.0, 8.0]);
        assert_eq!(samples.total, 8);
        assert!(samples.has_wrapped());
    }

    #[test]
    fn test_capacity_one() {
        let mut ring = RingBuffer::new(1);
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.snapshot().values, vec![2.0]);
        assert_eq!(ring.total(), 2);
    }

    #[test]
    fn test_iter_matches_snapshot() {
        let mut ring = RingBuffer::new(4);
        for i in 0..6 {
            ring.push(f64::from(i));
        }
        let collected: Vec<f64> = ring.iter().collect();
        assert_eq!(collected, ring.snapshot().values);
    }

    #[test]
    fn test_nan_and_infinity_are_stored() {
        let mut ring = RingBuffer::new(2);
        ring.push(f64::NAN);
        ring.push(f64::INFINITY);
        let values = ring.snapshot().values;
        assert!(values[0].is_nan());
        assert_eq!(values[1], f64::INFINITY);
    }
}
