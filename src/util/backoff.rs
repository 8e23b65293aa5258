use std::time::Duration;

use rand::Rng;

use crate::config::Retry;

/// Exponential backoff consumed by the fallback chain.
///
/// The delay before retry `n` (0-based) is `base * factor^n`, optionally
/// jittered by +/- 50%, and never longer than `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total tries per source, the first one included.
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            max_attempts: 5,
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl From<&Retry> for BackoffPolicy {
    fn from(retry: &Retry) -> Self {
        BackoffPolicy {
            max_attempts: retry.max_attempts.max(1),
            base: Duration::from_millis(retry.base_delay_ms),
            factor: if retry.factor.is_finite() && retry.factor >= 1.0 {
                retry.factor
            } else {
                1.0
            },
            max: Duration::from_millis(retry.max_delay_ms),
            jitter: retry.jitter,
        }
    }
}

impl BackoffPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        BackoffPolicy {
            max_attempts,
            base: Duration::ZERO,
            factor: 1.0,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay to wait before the given retry (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let seconds = self.base.as_secs_f64() * self.factor.powi(retry as i32);
        let max = self.max.as_secs_f64();
        let mut seconds = seconds.min(max);

        if self.jitter && seconds > 0.0 {
            seconds *= rand::rng().random_range(0.5..=1.5);
        }

        Duration::from_secs_f64(seconds.clamp(0.0, max))
    }

    /// The sleeps between tries: one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..policy.max_attempts.saturating_sub(1)).map(move |retry| policy.delay(retry))
    }
}
