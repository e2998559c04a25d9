//! Fixed-capacity sample ring
//!
//! `SampleRing` is the unsynchronised core of every rolling statistic in the
//! station: `size` floating-point slots and a write cursor that wraps to zero.
//! The first write fills every slot so a freshly started buffer does not report
//! a cold-start bias towards zero.
//!
//! Locking and cascading live in [`crate::stats`] and [`crate::cascade`].

use serde::{Deserialize, Serialize};

/// Which summary statistic a cascade edge forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Average,
    Minimum,
    Maximum,
    Sum,
}

/// Summary statistics over a window of samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub sum: f64,
}

impl Stats {
    /// Pick a single statistic out of the summary
    pub fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Average => self.average,
            Statistic::Minimum => self.minimum,
            Statistic::Maximum => self.maximum,
            Statistic::Sum => self.sum,
        }
    }

    /// Summarise `count` values.
    ///
    /// The minimum starts from `f64::MAX` and the maximum from zero, so the
    /// maximum never reports below zero.
    fn from_values(values: impl Iterator<Item = f64>, count: usize) -> Self {
        if count == 0 {
            return Self::default();
        }

        let mut minimum = f64::MAX;
        let mut maximum = 0.0;
        let mut sum = 0.0;
        for x in values {
            if x > maximum {
                maximum = x;
            }
            if x < minimum {
                minimum = x;
            }
            sum += x;
        }

        Self {
            average: sum / count as f64,
            minimum,
            maximum,
            sum,
        }
    }
}

/// Copy of a ring's backing storage together with its cursor
#[derive(Debug, Clone, PartialEq)]
pub struct RawData {
    pub data: Vec<f64>,
    pub size: usize,
    pub position: usize,
}

/// Fixed-size circular buffer of samples
#[derive(Debug, Clone)]
pub struct SampleRing {
    data: Vec<f64>,
    position: usize,
    first_write: bool,
}

impl SampleRing {
    /// Create a ring with `size` slots. A size of zero is raised to one.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0.0; size.max(1)],
            position: 0,
            first_write: true,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Slot the next write goes to
    pub fn position(&self) -> usize {
        self.position
    }

    /// True once at least one sample has been written
    pub fn has_data(&self) -> bool {
        !self.first_write
    }

    /// Write a sample and advance the cursor.
    ///
    /// Returns `true` when the cursor wrapped back to slot zero, i.e. a full
    /// window has just been completed.
    pub fn push(&mut self, value: f64) -> bool {
        if self.first_write {
            self.data.fill(value);
            self.first_write = false;
        } else {
            self.data[self.position] = value;
        }

        self.position += 1;
        if self.position == self.data.len() {
            self.position = 0;
            return true;
        }
        false
    }

    /// Set every slot to `value` without moving the cursor.
    ///
    /// The ring then counts as written, so the next push replaces a single
    /// slot instead of filling the window.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
        self.first_write = false;
    }

    /// Add to the slot under the cursor without advancing it
    pub fn add_to_current(&mut self, delta: f64) {
        self.data[self.position] += delta;
    }

    /// Statistics over every slot
    pub fn stats(&self) -> Stats {
        Stats::from_values(self.data.iter().copied(), self.data.len())
    }

    /// Statistics over the most recent `count` samples, oldest first.
    ///
    /// `count` is clamped to the ring size.
    pub fn sum_min_max_last(&self, count: usize) -> Stats {
        let count = count.min(self.size());
        let start = (self.position + self.size() - count) % self.size();
        self.stats_from(start, count)
    }

    /// Average of the most recent `count` samples (clamped to the ring size)
    pub fn average_last(&self, count: usize) -> f64 {
        self.sum_min_max_last(count).average
    }

    /// Average of `count` samples starting at slot `index`, wrapping through zero
    pub fn average_last_from(&self, count: usize, index: usize) -> f64 {
        let count = count.min(self.size());
        self.stats_from(index % self.size(), count).average
    }

    /// Most recently written value
    pub fn last(&self) -> f64 {
        self.data[(self.position + self.size() - 1) % self.size()]
    }

    pub fn raw_data(&self) -> RawData {
        RawData {
            data: self.data.clone(),
            size: self.size(),
            position: self.position,
        }
    }

    fn stats_from(&self, start: usize, count: usize) -> Stats {
        let size = self.size();
        Stats::from_values((0..count).map(|i| self.data[(start + i) % size]), count)
    }
}
