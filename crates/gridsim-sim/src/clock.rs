//! Simulated time.
//!
//! Time is a plain `f64` number of simulated seconds, the unit every
//! resource amount is expressed against (flops / speed, bytes / bandwidth).
//! It only advances when the driver says so and never goes backwards.

/// Deterministic clock advanced by the simulation driver.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    /// Seconds since the start of the simulation.
    now: f64,
}

impl SimClock {
    /// Creates a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Creates a clock starting at the specified time.
    pub fn at(now: f64) -> Self {
        Self { now }
    }

    /// Returns the current simulated time in seconds.
    #[inline]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advances time to the given value.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `time < self.now()` (time going backwards).
    pub fn advance_to(&mut self, time: f64) {
        debug_assert!(
            time >= self.now,
            "time cannot go backwards: current={}, target={}",
            self.now,
            time
        );
        self.now = time;
    }

    /// Advances the clock by a non-negative delta.
    #[inline]
    pub fn advance_by(&mut self, delta: f64) {
        self.advance_to(self.now + delta);
    }
}
