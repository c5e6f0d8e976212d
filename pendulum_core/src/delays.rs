//! Rolling delay histories used as statistical fallback inputs.

use std::collections::VecDeque;

/// Bounded, append-only history of observed delays in milliseconds.
///
/// When full, the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct DelayHistory {
    cap: usize,
    samples: VecDeque<u64>,
    // Scratch buffer so median() does not allocate per call
    scratch: Vec<u64>,
}

impl DelayHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            samples: VecDeque::with_capacity(cap),
            scratch: Vec::with_capacity(cap),
        }
    }

    pub fn push(&mut self, delay_ms: u64) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(delay_ms);
    }

    /// Median of the recorded delays; the mean of the two middle samples
    /// (rounded half up) for even counts. `None` when empty.
    pub fn median(&mut self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        self.scratch.clear();
        self.scratch.extend(self.samples.iter().copied());
        self.scratch.sort_unstable();
        let n = self.scratch.len();
        let mid = n / 2;
        if n.is_multiple_of(2) {
            let a = self.scratch[mid - 1];
            let b = self.scratch[mid];
            Some(a / 2 + b / 2 + (a % 2 + b % 2).div_ceil(2))
        } else {
            Some(self.scratch[mid])
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::DelayHistory;

    #[test]
    fn median_of_odd_history() {
        let mut h = DelayHistory::new(100);
        for d in [160, 120, 140] {
            h.push(d);
        }
        assert_eq!(h.median(), Some(140));
    }

    #[test]
    fn median_of_even_history_rounds_half_up() {
        let mut h = DelayHistory::new(100);
        for d in [100, 141] {
            h.push(d);
        }
        assert_eq!(h.median(), Some(121));
        h.push(u64::MAX);
        h.push(u64::MAX);
        // [100, 141, MAX, MAX] -> mean of 141 and MAX without overflow
        assert_eq!(h.median(), Some(141 / 2 + u64::MAX / 2 + 1));
    }

    #[test]
    fn empty_history_has_no_median() {
        let mut h = DelayHistory::new(3);
        assert_eq!(h.median(), None);
    }

    #[test]
    fn oldest_samples_are_evicted_first() {
        let mut h = DelayHistory::new(3);
        for d in [1000, 1000, 10, 20, 30] {
            h.push(d);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.median(), Some(20));
    }
}
