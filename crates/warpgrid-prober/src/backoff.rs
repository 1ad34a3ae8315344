//! Exponential retry delay with an upper bound and jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ProberConfig;

/// Retry delay for one endpoint loop.
///
/// Doubles after every attempt up to `max`. Each returned delay is
/// spread by `±jitter` so loops probing the same backend drift apart.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
            current: base,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ProberConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff(), config.backoff_jitter)
    }

    /// Delay to wait before the next attempt. Advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempts += 1;
        self.spread(delay)
    }

    /// Return to the base delay.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    /// Number of delays handed out since creation or the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn spread(&self, delay: Duration) -> Duration {
        if self.jitter == 0.0 {
            return delay;
        }
        let factor = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        delay.mul_f64(factor).min(self.max)
    }
}
