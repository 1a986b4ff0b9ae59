use crate::models::CandleSample;
use std::collections::VecDeque;

/// Closed candles kept per symbol
pub const WINDOW_CAPACITY: usize = 10;

/// Rolling window of closed candles for a single symbol
///
/// Owned by one engine; no locking.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    samples: VecDeque<CandleSample>,
    capacity: usize,
}

impl CandleWindow {
    /// Create a window holding at most `capacity` candles
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Add a candle, dropping the oldest once full
    pub fn append(&mut self, sample: CandleSample) {
        self.samples.push_back(sample);

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The `n` most recent candles, oldest first
    pub fn last_n(&self, n: usize) -> Vec<CandleSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandleSample> {
        self.samples.iter()
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
