//! Thread-safe rolling statistics buffer
//!
//! `RingStatBuffer` wraps a whole [`Cascade`] in one mutex, so a write and the
//! cascade it triggers are atomic with respect to every reader. Queries without
//! a tier argument address the root ring.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::cascade::{Cascade, TierId};

pub use crate::ring::{RawData, Stats};

#[derive(Debug)]
pub struct RingStatBuffer {
    inner: Mutex<Cascade>,
}

impl RingStatBuffer {
    /// Buffer with `size` slots and no downstream tiers
    pub fn new(size: usize) -> Self {
        Self::from_cascade(Cascade::single(size))
    }

    /// Buffer driving a prebuilt cascade; writes go into its root
    pub fn from_cascade(cascade: Cascade) -> Self {
        Self {
            inner: Mutex::new(cascade),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cascade> {
        // A panicking reader cannot leave a half-written slot behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_item(&self, value: f64) {
        self.lock().push(value);
    }

    /// Seed the root window with `value` without writing a sample
    pub fn fill(&self, value: f64) {
        self.lock().fill_root(value);
    }

    pub fn add_value_to_current_item(&self, delta: f64) {
        self.lock().add_to_current(delta);
    }

    pub fn average_min_max_sum(&self) -> Stats {
        self.lock().root_ring().stats()
    }

    pub fn sum_min_max_last(&self, count: usize) -> Stats {
        self.lock().root_ring().sum_min_max_last(count)
    }

    pub fn average_last(&self, count: usize) -> f64 {
        self.lock().root_ring().average_last(count)
    }

    pub fn average_last_from(&self, count: usize, index: usize) -> f64 {
        self.lock().root_ring().average_last_from(count, index)
    }

    pub fn raw_data(&self) -> RawData {
        self.lock().root_ring().raw_data()
    }

    pub fn last(&self) -> f64 {
        self.lock().root_ring().last()
    }

    pub fn size(&self) -> usize {
        self.lock().root_ring().size()
    }

    pub fn tier(&self, name: &str) -> Option<TierId> {
        self.lock().tier_id(name)
    }

    pub fn tier_stats(&self, id: TierId) -> Option<Stats> {
        self.lock().tier_stats(id)
    }

    pub fn tier_raw_data(&self, id: TierId) -> Option<RawData> {
        self.lock().tier_raw_data(id)
    }

    /// Most recent value written into a downstream tier, `None` until it has data
    pub fn tier_last(&self, id: TierId) -> Option<f64> {
        let guard = self.lock();
        guard.ring(id).filter(|r| r.has_data()).map(|r| r.last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeBuilder, Statistic};
    use std::sync::Arc;

    #[test]
    fn single_write_fills_buffer() {
        let buffer = RingStatBuffer::new(10);
        buffer.add_item(3.0);

        let stats = buffer.average_min_max_sum();
        assert_eq!(stats.average, 3.0);
        assert_eq!(stats.minimum, 3.0);
        assert_eq!(stats.maximum, 3.0);
        assert_eq!(stats.sum, 30.0);
    }

    #[test]
    fn add_value_to_current_item_accumulates() {
        let buffer = RingStatBuffer::new(3);
        buffer.add_item(0.0);
        buffer.add_value_to_current_item(2.0);
        buffer.add_value_to_current_item(2.0);

        let raw = buffer.raw_data();
        assert_eq!(raw.data, vec![0.0, 4.0, 0.0]);
        assert_eq!(raw.position, 1);
        assert_eq!(buffer.average_min_max_sum().sum, 4.0);
    }

    #[test]
    fn tier_queries_reach_rollups() {
        let mut builder = CascadeBuilder::new();
        let root = builder.tier("tips", 2);
        let totals = builder.tier("totals", 4);
        builder.feed(root, Statistic::Sum, totals);
        let buffer = RingStatBuffer::from_cascade(builder.build(root).unwrap());

        let id = buffer.tier("totals").unwrap();
        assert_eq!(buffer.tier_last(id), None);

        buffer.add_item(1.0);
        buffer.add_item(2.0);

        assert_eq!(buffer.tier_last(id), Some(3.0));
        assert_eq!(buffer.tier_stats(id).unwrap().sum, 12.0);
        assert_eq!(buffer.tier_raw_data(id).unwrap().size, 4);
    }

    #[test]
    fn concurrent_writers_are_serialised() {
        let buffer = Arc::new(RingStatBuffer::new(1000));
        buffer.add_item(0.0);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        buffer.add_value_to_current_item(1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.average_min_max_sum().sum, 1000.0);
    }

    #[test]
    fn last_and_windows_delegate_to_root() {
        let buffer = RingStatBuffer::new(4);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            buffer.add_item(v);
        }
        assert_eq!(buffer.last(), 5.0);
        assert_eq!(buffer.average_last(2), 4.5);
        assert_eq!(buffer.sum_min_max_last(3).sum, 12.0);
        assert_eq!(buffer.average_last_from(2, 1), 2.5);
        assert_eq!(buffer.size(), 4);
    }
}
