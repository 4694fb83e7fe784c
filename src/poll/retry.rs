//! Retry executor.
//!
//! Runs one probe per invocation and turns retryable failures into a
//! scheduled retry persisted under a retry key of the phase's progress.
//! The executor never sleeps: a scheduled retry comes back as
//! [`Step::Suspend`] and the host re-invokes the task at `resume_at`.
//!
//! Per retry key the executor moves through
//! `Idle -> Attempting -> (Success | RetryScheduled | Fatal)`, where
//! `RetryScheduled` is a [`RetryProgress`] record that sends the next
//! invocation back to `Attempting` once its not-before instant passed.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::backoff::BackoffPolicy;
use super::probe::Probe;
use super::{Step, SuspendReason};
use crate::error::{Result, WaitError};
use crate::state::{PhaseProgress, RetryProgress};

/// Wraps a probe with backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryExecutor<'a> {
    key: &'a str,
    resource: &'a str,
    policy: &'a BackoffPolicy,
}

impl<'a> RetryExecutor<'a> {
    /// `key` names the retry record inside the phase, `resource` is used in
    /// messages and to spread jitter across tables.
    pub fn new(key: &'a str, resource: &'a str, policy: &'a BackoffPolicy) -> Self {
        Self {
            key,
            resource,
            policy,
        }
    }

    pub fn resource(&self) -> &str {
        self.resource
    }

    /// Run `probe` once unless a scheduled retry is still pending.
    ///
    /// Returns `Ready(Some(value))` when satisfied and `Ready(None)` when not
    /// satisfied; both clear this key's retry record. Fatal failures and an
    /// exhausted retry budget are errors.
    pub fn run<T, F>(
        &self,
        phase: &mut PhaseProgress,
        now: DateTime<Utc>,
        probe: F,
    ) -> Result<Step<Option<T>>>
    where
        F: FnOnce() -> Probe<T>,
    {
        if let Some(retry) = phase.retries.get(self.key) {
            if retry.retry_not_before > now {
                debug!(
                    "Retry '{}' for {} not due until {}",
                    self.key, self.resource, retry.retry_not_before
                );
                return Ok(Step::Suspend {
                    resume_at: retry.retry_not_before,
                    reason: SuspendReason::Retrying {
                        attempt: retry.attempts,
                        error: retry.last_error.clone(),
                    },
                });
            }
        }

        match probe() {
            Probe::Satisfied(value) => {
                phase.retries.remove(self.key);
                Ok(Step::Ready(Some(value)))
            }
            Probe::NotSatisfied => {
                phase.retries.remove(self.key);
                Ok(Step::Ready(None))
            }
            Probe::FatalFailure(e) => {
                phase.retries.remove(self.key);
                Err(WaitError::FatalRemote {
                    resource: self.resource.to_string(),
                    message: e.to_string(),
                })
            }
            Probe::RetryableFailure(e) => {
                let retry = phase
                    .retries
                    .entry(self.key.to_string())
                    .or_insert_with(|| RetryProgress {
                        attempts: 0,
                        first_failure_at: now,
                        retry_not_before: now,
                        last_error_kind: e.kind,
                        last_error: String::new(),
                    });
                retry.attempts = retry.attempts.saturating_add(1);
                retry.last_error_kind = e.kind;
                retry.last_error = e.to_string();

                if self.policy.is_exhausted(retry.first_failure_at, now) {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        self.resource, retry.attempts, retry.last_error
                    );
                    return Err(WaitError::RetryBudgetExhausted {
                        resource: self.resource.to_string(),
                        key: self.key.to_string(),
                        attempts: retry.attempts,
                        last_error: retry.last_error.clone(),
                    });
                }

                let seed = format!("{}/{}", self.resource, self.key);
                retry.retry_not_before = self.policy.next_at(now, retry.attempts, &seed);
                warn!(
                    "Lookup of {} failed (attempt {}), retrying at {}: {}",
                    self.resource, retry.attempts, retry.retry_not_before, retry.last_error
                );

                Ok(Step::Suspend {
                    resume_at: retry.retry_not_before,
                    reason: SuspendReason::Retrying {
                        attempt: retry.attempts,
                        error: retry.last_error.clone(),
                    },
                })
            }
        }
    }
}
