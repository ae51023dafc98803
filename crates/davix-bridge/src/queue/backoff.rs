//! Retry backoff policies.

use std::fmt::Debug;
use std::time::Duration;

use davix_core::config::QueueConfig;
use rand::RngExt;

/// Delay before the next attempt, given how many attempts have failed.
pub trait BackoffPolicy: Send + Sync + Debug {
    fn delay(&self, attempts: u32) -> Duration;
}

/// Same delay after every failure.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff(pub Duration);

impl BackoffPolicy for ConstantBackoff {
    fn delay(&self, _attempts: u32) -> Duration {
        self.0
    }
}

/// `base * 2^(attempts - 1)`, capped at `max`, optionally jittered down to
/// half of that.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub const fn from_config(config: &QueueConfig) -> Self {
        Self {
            base: Duration::from_secs(config.backoff_base_secs),
            max: Duration::from_secs(config.backoff_max_secs),
            jitter: config.backoff_jitter,
        }
    }

    /// Deterministic delay for `attempts` with the jitter sample fixed.
    ///
    /// `jitter_unit` in `[0, 1]` maps to a factor in `[0.5, 1.0]`; it is
    /// ignored when jitter is disabled.
    pub fn delay_with(&self, attempts: u32, jitter_unit: f64) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exp = (attempts - 1).min(31);
        let raw = self.base.saturating_mul(1u32 << exp).min(self.max);
        if self.jitter {
            raw.mul_f64(0.5 + 0.5 * jitter_unit.clamp(0.0, 1.0))
        } else {
            raw
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempts: u32) -> Duration {
        let unit = if self.jitter {
            rand::rng().random_range(0.0..=1.0)
        } else {
            1.0
        };
        self.delay_with(attempts, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExponentialBackoff {
        ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(600)).without_jitter()
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.delay(1), Duration::from_secs(30));
        assert_eq!(p.delay(2), Duration::from_secs(60));
        assert_eq!(p.delay(3), Duration::from_secs(120));
        assert_eq!(p.delay(5), Duration::from_secs(480));
        assert_eq!(p.delay(6), Duration::from_secs(600));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn zero_attempts_has_no_delay() {
        assert_eq!(policy().delay(0), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let p = ExponentialBackoff::new(Duration::from_secs(100), Duration::from_secs(1000));
        assert_eq!(p.delay_with(1, 0.0), Duration::from_secs(50));
        assert_eq!(p.delay_with(1, 1.0), Duration::from_secs(100));
        assert_eq!(p.delay_with(1, 7.0), Duration::from_secs(100));

        for _ in 0..100 {
            let d = p.delay(2);
            assert!(d >= Duration::from_secs(100) && d <= Duration::from_secs(200), "{d:?}");
        }
    }

    #[test]
    fn constant_ignores_attempts() {
        let p = ConstantBackoff(Duration::from_secs(7));
        assert_eq!(p.delay(1), p.delay(9));
    }

    #[test]
    fn from_config_reads_queue_section() {
        let config = QueueConfig {
            backoff_base_secs: 5,
            backoff_max_secs: 50,
            backoff_jitter: false,
            ..QueueConfig::default()
        };
        let p = ExponentialBackoff::from_config(&config);
        assert_eq!(p.delay(3), Duration::from_secs(20));
        assert_eq!(p.delay(10), Duration::from_secs(50));
    }
}
