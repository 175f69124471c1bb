//! Deterministic random number generation.
//!
//! Every random decision of a run (fault injection, workload generation in
//! tests) draws from a [`SimRng`] derived from the configured seed, so the
//! same seed always replays the same run.
//!
//! Components get their own stream through [`SimRng::fork`]:
//!
//! ```text
//! master (seed 12345)
//!   ├─> faults   (forked)
//!   └─> workload (forked)
//! ```

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seeded, reproducible random number generator.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: SmallRng,
    seed: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.r#gen()
    }

    /// Generates a random `f64` in the range `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.r#gen()
    }

    /// Generates a random `bool` with the given probability of being `true`.
    #[inline]
    pub fn next_bool_with_probability(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Generates a random `usize` in the range `[0, max)`.
    pub fn next_usize(&mut self, max: usize) -> usize {
        debug_assert!(max > 0, "max must be positive");
        self.inner.gen_range(0..max)
    }

    /// Generates a random `f64` in the range `[min, max)`.
    pub fn next_f64_range(&mut self, min: f64, max: f64) -> f64 {
        debug_assert!(min < max, "min must be < max");
        self.inner.gen_range(min..max)
    }

    /// Forks an independent stream deterministically derived from this one.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }
}
