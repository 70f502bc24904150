//! Injectable randomness
//!
//! Entry routing, retry jitter and identity rotation all draw from a `RandomSource`
//! so tests can pin every random decision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of uniform random numbers in [0, 1)
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;

    /// Uniform index in `0..len`; `len` must be non-zero
    fn next_index(&self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// Process-wide random stream backed by the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic stream for reproducible runs and tests
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen::<f64>()
    }
}

/// Always returns the same value
///
/// Useful to remove jitter: `FixedRandom(0.5)` makes the retry jitter factor exactly 1.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0.clamp(0.0, 0.999_999)
    }
}
