//! In-memory block buffer used during run creation.

use crate::record::{Record, RECORD_SIZE};

/// Buffer limited by records count.
pub struct BlockBuffer {
    limit: usize,
    inner: Vec<f64>,
}

impl BlockBuffer {
    pub fn new(limit: usize) -> Self {
        BlockBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, value: f64) {
        self.inner.push(value);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts the buffered records in ascending order and returns them.
    pub fn into_sorted(mut self) -> Vec<f64> {
        self.inner.sort_unstable_by(|a, b| Record(*a).cmp(&Record(*b)));
        self.inner
    }
}

/// Returns the number of records fitting into `bytes` of memory (at least one).
pub fn block_size_for_memory(bytes: u64) -> usize {
    let records = bytes / RECORD_SIZE as u64;
    usize::try_from(records).unwrap_or(usize::MAX).max(1)
}
