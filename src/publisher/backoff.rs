//! Retry delay after failed cycles
//!
//! Exponential in the number of consecutive failures, capped, with
//! multiplicative jitter so a fleet of publishers does not retry in lockstep.

use crate::config::BackoffSection;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(section: &BackoffSection) -> Self {
        Self::new(
            Duration::from_millis(section.initial_ms),
            Duration::from_millis(section.max_ms),
            section.multiplier,
            section.jitter,
        )
    }

    /// Delay before retry number `failures`, without jitter
    ///
    /// `failures` counts consecutive failed cycles; zero means no wait.
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// Delay before retry number `failures`, jittered and capped at `max`
    pub fn delay<R: Rng + ?Sized>(&self, failures: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(failures);
        if base.is_zero() || self.jitter == 0.0 {
            return base;
        }
        let factor = rng.gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(factor).min(self.max)
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffSection::default())
    }
}
