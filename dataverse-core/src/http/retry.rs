//! Retry policy: bounded attempts, exponential backoff, jitter.
//!
//! The policy is a plain value injected into `HttpClient`; it decides how many
//! attempts a call gets and how long to wait between them, and nothing else.

use rand::Rng;
use std::time::Duration;

/// Randomization applied to each backoff delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Exact exponential delays.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay * (1 - f), delay]`, `f` clamped to `[0, 1]`.
    Proportional(f64),
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with(delay, &mut rand::thread_rng())
    }

    pub fn apply_with<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match *self {
            Jitter::None => delay,
            Jitter::Full => delay.mul_f64(rng.gen_range(0.0..=1.0)),
            Jitter::Proportional(f) => {
                let f = if f.is_finite() { f.clamp(0.0, 1.0) } else { 0.0 };
                delay.mul_f64(rng.gen_range((1.0 - f)..=1.0))
            }
        }
    }
}

/// Bounded exponential backoff.
///
/// Attempt `n` (1-based) that fails transiently is followed by a wait of
/// `min(base * 2^(n-1), max_delay)` before jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Jitter,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is bumped to one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(8),
            jitter: Jitter::Proportional(0.2),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Deterministic delay after failed attempt `attempt`, before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Actual wait after failed attempt `attempt`.
    ///
    /// A server-provided `Retry-After` raises the wait but never past `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.jitter.apply(self.backoff(attempt));
        match retry_after {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 2s base, 10s cap.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2)).with_max_delay(Duration::from_secs(10))
    }
}
