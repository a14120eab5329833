//! Bounded per-station reading history.

use std::collections::VecDeque;
use thiserror::Error;

use crate::reading::{DatumValue, Reading};

/// Fixed-capacity FIFO of readings, newest last. Sized once at station
/// construction, never resized; the oldest reading is evicted on overflow.
#[derive(Debug)]
pub struct ReadingsFifo {
    capacity: usize,
    items: VecDeque<Reading>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FifoError {
    #[error("only {available} of {wanted} readings available")]
    NotEnough { available: usize, wanted: usize },
}

impl ReadingsFifo {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "readings fifo requires capacity >= 1");
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, reading: Reading) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(reading);
    }

    /// Ordered clone of the history, newest last.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.items.iter().cloned().collect()
    }

    /// Values of the last `n` readings for `datum`, oldest first. Fails when
    /// fewer than `n` readings carrying that datum are present.
    pub fn latest(&self, datum: &str, n: usize) -> Result<Vec<DatumValue>, FifoError> {
        let values: Vec<DatumValue> = self
            .items
            .iter()
            .filter_map(|reading| reading.datums.get(datum).copied())
            .collect();
        if values.len() < n {
            return Err(FifoError::NotEnough {
                available: values.len(),
                wanted: n,
            });
        }
        Ok(values[values.len() - n..].to_vec())
    }
}
