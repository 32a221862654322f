//! Injectable randomness.
//!
//! Production rolls come from the operating system's CSPRNG; tests inject
//! fixed sequences so drop pipelines are fully deterministic.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::Rng;

/// Source of uniform floats in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;

    /// Uniform index in `[0, n)`. `n` must be nonzero.
    fn pick_index(&self, n: usize) -> usize {
        let idx = (self.next_f64() * n as f64) as usize;
        idx.min(n - 1)
    }
}

/// Cryptographically-strong source backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn next_f64(&self) -> f64 {
        let mut rng = OsRng;
        rng.gen::<f64>()
    }
}

/// Deterministic source for tests: yields a fixed sequence, then repeats
/// the configured fallback.
pub struct SequenceSource {
    values: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl SequenceSource {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            fallback: 0.5,
        }
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn remaining(&self) -> usize {
        self.values.lock().unwrap().len()
    }
}

impl RandomSource for SequenceSource {
    fn next_f64(&self) -> f64 {
        self.values
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_source_stays_in_unit_interval() {
        let source = OsRandomSource;
        for _ in 0..1000 {
            let v = source.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn sequence_source_replays_then_falls_back() {
        let source = SequenceSource::new([0.1, 0.9]).with_fallback(0.25);
        assert_eq!(source.next_f64(), 0.1);
        assert_eq!(source.next_f64(), 0.9);
        assert_eq!(source.next_f64(), 0.25);
        assert_eq!(source.next_f64(), 0.25);
    }

    #[test]
    fn pick_index_covers_range() {
        let source = SequenceSource::new([0.0, 0.5, 0.999]);
        assert_eq!(source.pick_index(2), 0);
        assert_eq!(source.pick_index(2), 1);
        assert_eq!(source.pick_index(2), 1);
    }
}
