//! Exponential backoff with deterministic jitter.
//!
//! The delay for attempt `n` (1-based) is `initial * 2^(n-1)` plus up to
//! half of that again as jitter, capped at `max_interval`. Doubling the
//! nominal delay always covers the previous attempt's jitter, so delays
//! never decrease as attempts grow.
//!
//! Jitter is derived from a SHA-256 of a caller-supplied seed and the
//! attempt number. Re-running the same attempt after a crash reproduces the
//! same delay, while different tasks spread out.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, WaitError};

/// Attempt count in, delay out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the second attempt, in seconds.
    pub initial_interval_secs: u64,

    /// Upper bound for any delay, in seconds.
    pub max_interval_secs: u64,

    /// Give up this many seconds after the first failure (`None` = never).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl BackoffPolicy {
    /// Policy for retryable remote errors: 1s doubling to 30s, 45 minute budget.
    pub fn retry_default() -> Self {
        Self {
            initial_interval_secs: 1,
            max_interval_secs: 30,
            timeout_secs: Some(45 * 60),
        }
    }

    /// Policy for "not yet satisfied": 5s doubling to 5 minutes, unbounded.
    pub fn poll_default() -> Self {
        Self {
            initial_interval_secs: 5,
            max_interval_secs: 5 * 60,
            timeout_secs: None,
        }
    }

    /// Reject policies that would busy-loop or never reach their cap.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.initial_interval_secs == 0 {
            return Err(WaitError::invalid_input(format!(
                "{}: initial_interval_secs must be greater than zero",
                name
            )));
        }
        if self.max_interval_secs < self.initial_interval_secs {
            return Err(WaitError::invalid_input(format!(
                "{}: max_interval_secs ({}) is less than initial_interval_secs ({})",
                name, self.max_interval_secs, self.initial_interval_secs
            )));
        }
        if let Some(secs) = self.timeout_secs {
            if timeout_delta(secs).is_none() {
                return Err(WaitError::invalid_input(format!(
                    "{}: timeout_secs ({}) is out of range",
                    name, secs
                )));
            }
        }
        Ok(())
    }

    /// Delay to wait after the `attempt`-th failed or unsatisfied try.
    pub fn delay(&self, attempt: u32, jitter_seed: &str) -> Duration {
        let max_ms = self.max_interval_secs.saturating_mul(1_000);
        let initial_ms = self.initial_interval_secs.saturating_mul(1_000);

        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let nominal_ms = initial_ms.saturating_mul(factor).min(max_ms);
        let jitter_ms = jitter(jitter_seed, attempt) % (nominal_ms / 2 + 1);

        Duration::from_millis(nominal_ms.saturating_add(jitter_ms).min(max_ms))
    }

    /// Instant of the next try after the `attempt`-th one at `now`.
    pub fn next_at(&self, now: DateTime<Utc>, attempt: u32, jitter_seed: &str) -> DateTime<Utc> {
        let delay = TimeDelta::from_std(self.delay(attempt, jitter_seed)).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether a failure streak that began at `since` is out of budget at `now`.
    ///
    /// A timeout too large to represent never runs out.
    pub fn is_exhausted(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.timeout_secs.and_then(timeout_delta) {
            Some(budget) => now.signed_duration_since(since) >= budget,
            None => false,
        }
    }
}

fn timeout_delta(secs: u64) -> Option<TimeDelta> {
    TimeDelta::try_seconds(i64::try_from(secs).ok()?)
}

fn jitter(seed: &str, attempt: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
