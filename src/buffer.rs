//! Bounded, self-shuffling holding area for fetched search results.
//!
//! Pages of results are poured in with [`ResultBuffer::add`] and served one at
//! a time from the front with [`ResultBuffer::take`]. Anything that does not
//! fit is dropped on the floor rather than queued.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::BufferError;

/// A capacity-limited buffer of results with optional reshuffling on insert.
#[derive(Debug, Clone)]
pub struct ResultBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    auto_randomize: bool,
    rng: StdRng,
}

impl<T> ResultBuffer<T> {
    /// Construct an empty buffer seeded from the operating system.
    ///
    /// # Errors
    /// Returns [`BufferError::ZeroCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize, auto_randomize: bool) -> Result<Self, BufferError> {
        Self::with_rng(capacity, auto_randomize, StdRng::from_os_rng())
    }

    /// Construct an empty buffer that shuffles with the given generator.
    ///
    /// # Errors
    /// Returns [`BufferError::ZeroCapacity`] if `capacity` is 0.
    pub fn with_rng(
        capacity: usize,
        auto_randomize: bool,
        rng: StdRng,
    ) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            items: Vec::with_capacity(capacity),
            capacity,
            auto_randomize,
            rng,
        })
    }

    /// Number of items contained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots left before the buffer is full.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    /// Append as many of `records` as fit, in order, and drop the rest.
    ///
    /// Returns how many were appended. When auto-randomize is on the whole
    /// buffer is reshuffled afterwards, even if nothing new fit.
    pub fn add<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let before = self.items.len();
        let free = self.free_space();
        self.items.extend(records.into_iter().take(free));
        if self.auto_randomize {
            self.stir();
        }
        self.items.len() - before
    }

    /// Uniformly permute the contents (Fisher-Yates, front to back).
    pub fn stir(&mut self) {
        let n = self.items.len();
        if n < 2 {
            return;
        }
        for i in 0..n - 1 {
            let j = self.rng.random_range(i..n);
            self.items.swap(i, j);
        }
    }

    /// Remove and return the front item, or `None` once drained.
    pub fn take(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Drop all contents. Capacity and the randomize flag are kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Borrow the current contents in serving order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}
