//! Reconnect pacing for the link and session supervisors.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`, then
//! jittered. The base is derived from the attempt number alone so jitter never
//! feeds back into later delays. [`BackoffPolicy::immediate`] disables pacing
//! entirely and retries on the spot.
//!
//! ```rust
//! use std::time::Duration;
//! use uplink::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Result, UplinkError};

/// Randomization applied to a backoff delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Exact delay
    None,

    /// Uniform in `[0, delay]`
    Full,

    /// `delay / 2` plus uniform in `[0, delay / 2]`
    #[default]
    Equal,
}

impl JitterPolicy {
    /// Apply this jitter to `delay`
    pub fn apply(self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return delay;
        }

        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 { 0 } else { rng.random_range(0..=half) };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

/// Exponential retry delay with a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(rename = "first_ms", with = "millis")]
    pub first: Duration,

    /// Ceiling applied before jitter
    #[serde(rename = "max_ms", with = "millis")]
    pub max: Duration,

    /// Growth factor per attempt
    pub factor: f64,

    /// Randomization applied to the clamped delay
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Retry at once, every time
    pub fn immediate() -> Self {
        Self { first: Duration::ZERO, max: Duration::ZERO, factor: 1.0, jitter: JitterPolicy::None }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };

        self.jitter.apply(base)
    }

    /// Reject factors that would shrink or break the delay sequence
    pub fn validate(&self, field: &str) -> Result<()> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(UplinkError::invalid_config(
                format!("{field}.factor"),
                format!("must be a finite number >= 1.0, got {}", self.factor),
            ));
        }
        if self.first > self.max {
            return Err(UplinkError::invalid_config(
                format!("{field}.first_ms"),
                "must not exceed max_ms",
            ));
        }
        Ok(())
    }
}

/// Serde adapter for durations written as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }

    /// Same as the parent module, for `Option<Duration>`
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let policy = exact(100, 30_000, 2.0);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn ceiling_holds_for_huge_attempts() {
        let policy = exact(100, 10_000, 2.0);
        assert_eq!(policy.delay(40), Duration::from_secs(10));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn immediate_never_waits() {
        let policy = BackoffPolicy::immediate();
        for attempt in [0, 1, 5, 1000] {
            assert_eq!(policy.delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let policy = BackoffPolicy { jitter: JitterPolicy::Equal, ..exact(1000, 30_000, 1.0) };
        for attempt in 0..50 {
            let delay = policy.delay(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let policy = BackoffPolicy { jitter: JitterPolicy::Full, ..exact(100, 30_000, 2.0) };
        for attempt in 0..12 {
            let base = exact(100, 30_000, 2.0).delay(attempt);
            assert!(policy.delay(attempt) <= base);
        }
    }

    #[test]
    fn validate_rejects_shrinking_factor() {
        assert!(exact(100, 1000, 0.5).validate("link.retry").is_err());
        assert!(exact(100, 1000, f64::NAN).validate("link.retry").is_err());
        assert!(exact(2000, 1000, 2.0).validate("link.retry").is_err());
        assert!(BackoffPolicy::default().validate("link.retry").is_ok());
        assert!(BackoffPolicy::immediate().validate("link.retry").is_ok());
    }

    #[test]
    fn deserializes_from_millisecond_fields() {
        let policy: BackoffPolicy =
            serde_yaml_ng::from_str("first_ms: 250\nmax_ms: 4000\njitter: none\n").unwrap();
        assert_eq!(policy.first, Duration::from_millis(250));
        assert_eq!(policy.max, Duration::from_secs(4));
        assert_eq!(policy.factor, 2.0);
        assert_eq!(policy.jitter, JitterPolicy::None);
    }
}
