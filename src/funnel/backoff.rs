use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with symmetric jitter
///
/// `delay(k) = min(max_delay, max(0, base * 2^k + U(-jitter, +jitter)))`
/// where `k` is the 0-based index of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.jitter_ms),
        )
    }

    /// Policy that never waits
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// `base * 2^k` before jitter and capping, saturating on overflow
    pub fn nominal(&self, k: u32) -> Duration {
        let factor = 2u32.checked_pow(k).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Delay after the failed attempt `k`, using the given random source
    pub fn delay_for<R: Rng + ?Sized>(&self, k: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal(k).as_millis() as i128;
        let jitter = self.jitter.as_millis() as i128;

        let offset = if jitter > 0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0
        };

        let millis = (nominal + offset)
            .max(0)
            .min(self.max_delay.as_millis() as i128);
        Duration::from_millis(millis as u64)
    }

    /// Delay after the failed attempt `k`
    pub fn delay(&self, k: u32) -> Duration {
        self.delay_for(k, &mut rand::thread_rng())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
