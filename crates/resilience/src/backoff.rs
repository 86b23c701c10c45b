//! Backoff policy shared by every polling and retry loop
//!
//! A single policy object covers both shapes the runtime needs: exponential
//! growth with a ceiling, and a fixed interval (multiplier of `1.0`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff policy configuration
///
/// Delay for attempt `n` (0-based) is `initial * multiplier^n`, capped at
/// `max`. With `jitter` enabled the delay is spread by ±25% but still never
/// exceeds `max`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use stratus_resilience::BackoffPolicy;
///
/// let policy = BackoffPolicy::exponential(Duration::from_millis(200), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(0), Duration::from_millis(200));
/// assert_eq!(policy.delay_for(1), Duration::from_millis(400));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(2));
///
/// let fixed = BackoffPolicy::fixed(Duration::from_secs(1));
/// assert_eq!(fixed.delay_for(7), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub initial: Duration,

    /// Growth factor per attempt; `1.0` gives a fixed interval
    pub multiplier: f64,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max: Duration,

    /// Spread delays by ±25% to avoid synchronized pollers
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 2.0,
            max: Duration::from_secs(5),
            jitter: false,
        }
    }
}

/// Invalid policy parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// The first delay is zero, which turns a poll loop into a spin loop
    #[error("initial delay must be greater than zero")]
    ZeroInitial,

    /// Multiplier below 1.0 or not finite
    #[error("multiplier must be a finite value >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    /// Cap smaller than the first delay
    #[error("max delay ({max:?}) must be >= initial delay ({initial:?})")]
    MaxBelowInitial {
        /// Configured initial delay
        initial: Duration,
        /// Configured cap
        max: Duration,
    },
}

impl BackoffPolicy {
    /// Doubling backoff from `initial`, capped at `max`
    #[must_use]
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max,
            jitter: false,
        }
    }

    /// Constant interval between attempts
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            multiplier: 1.0,
            max: interval,
            jitter: false,
        }
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validate policy parameters
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.initial.is_zero() {
            return Err(PolicyError::ZeroInitial);
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(self.multiplier));
        }
        if self.max < self.initial {
            return Err(PolicyError::MaxBelowInitial {
                initial: self.initial,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Delay to wait after attempt `attempt` (0-based) before the next one
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if raw.is_finite() { raw.min(max_secs) } else { max_secs };

        let delay = if self.jitter {
            let spread = capped * 0.25;
            let jittered = capped + fastrand::f64().mul_add(2.0 * spread, -spread);
            jittered.clamp(0.0, max_secs)
        } else {
            capped
        };

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Stateful iterator over successive delays
    pub fn iter(&self) -> Backoff {
        Backoff::new(self.clone())
    }
}

/// Stateful delay sequence produced by a [`BackoffPolicy`]
///
/// The iterator never ends; callers decide when to stop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh sequence
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of delays handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Restart from the initial delay
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The policy driving this sequence
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}
