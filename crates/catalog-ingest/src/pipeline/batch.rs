//! Batch accumulator.
//!
//! Groups a record stream into batches of a fixed maximum size, preserving
//! arrival order. A batch is emitted as soon as it fills; whatever remains
//! when the input ends is emitted as a final, smaller batch.

use catalog_core::DEFAULT_BATCH_SIZE;
use std::iter::FusedIterator;

/// Upper bound on the capacity reserved up front for one batch.
const MAX_PREALLOCATED: usize = 10_000;

/// Resolve a configured batch size, falling back to [`DEFAULT_BATCH_SIZE`]
/// for zero or negative values.
pub fn effective_batch_size(configured: i64) -> usize {
    if configured <= 0 {
        DEFAULT_BATCH_SIZE
    } else {
        usize::try_from(configured).unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// Group `records` into batches of up to `batch_size` items.
pub fn accumulate<I: Iterator>(records: I, batch_size: usize) -> Batches<I> {
    Batches::new(records, batch_size)
}

/// Iterator adapter yielding `Vec` batches from an item iterator.
pub struct Batches<I> {
    inner: I,
    batch_size: usize,
    done: bool,
}

impl<I: Iterator> Batches<I> {
    /// Create a new batcher. A `batch_size` of zero uses [`DEFAULT_BATCH_SIZE`].
    pub fn new(inner: I, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };

        Self {
            inner,
            batch_size,
            done: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size.min(MAX_PREALLOCATED));
        while batch.len() < self.batch_size {
            match self.inner.next() {
                Some(item) => batch.push(item),
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() { None } else { Some(batch) }
    }
}

impl<I: Iterator> FusedIterator for Batches<I> {}
