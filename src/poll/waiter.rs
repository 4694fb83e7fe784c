//! Polling waiter.
//!
//! Turns "not satisfied yet" into a suspension of the whole task. The
//! waiter owns one phase of [`TaskState`]: it memoises the phase result
//! once satisfied, so a re-invocation that starts from the top skips
//! straight past completed phases.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::backoff::BackoffPolicy;
use super::probe::Probe;
use super::retry::RetryExecutor;
use super::{Step, SuspendReason};
use crate::error::Result;
use crate::state::{TaskState, WaitProgress};

/// Suspend-until-satisfied wrapper around a [`RetryExecutor`].
#[derive(Debug, Clone)]
pub struct PollingWaiter<'a> {
    phase: &'a str,
    message: String,
    policy: &'a BackoffPolicy,
    retry: RetryExecutor<'a>,
}

impl<'a> PollingWaiter<'a> {
    /// `message` is shown to operators while the phase is waiting.
    pub fn new(
        phase: &'a str,
        message: impl Into<String>,
        policy: &'a BackoffPolicy,
        retry: RetryExecutor<'a>,
    ) -> Self {
        Self {
            phase,
            message: message.into(),
            policy,
            retry,
        }
    }

    /// Advance this phase by at most one probe.
    pub fn run<T, F>(&self, state: &mut TaskState, now: DateTime<Utc>, probe: F) -> Result<Step<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Probe<T>,
    {
        let progress = state.phase_mut(self.phase);

        if let Some(done) = progress.completed::<T>()? {
            debug!("Phase '{}' already satisfied", self.phase);
            return Ok(Step::Ready(done));
        }

        if let Some(waiting) = &progress.waiting {
            if waiting.next_poll_at > now {
                debug!(
                    "Phase '{}' not due until {}",
                    self.phase, waiting.next_poll_at
                );
                return Ok(Step::Suspend {
                    resume_at: waiting.next_poll_at,
                    reason: SuspendReason::Waiting {
                        message: waiting.message.clone(),
                    },
                });
            }
            debug!(
                "Resuming phase '{}' after {} checks",
                self.phase, waiting.iteration
            );
        }

        match self.retry.run(progress, now, probe)? {
            Step::Suspend { resume_at, reason } => Ok(Step::Suspend { resume_at, reason }),
            Step::Ready(Some(value)) => {
                progress.complete(&value)?;
                info!("Phase '{}' satisfied for {}", self.phase, self.retry.resource());
                Ok(Step::Ready(value))
            }
            Step::Ready(None) => {
                let (iteration, started_at) = match &progress.waiting {
                    Some(w) => (w.iteration.saturating_add(1), w.started_at),
                    None => (1, now),
                };
                let seed = format!("{}/{}", self.retry.resource(), self.phase);
                let next_poll_at = self.policy.next_at(now, iteration, &seed);

                progress.waiting = Some(WaitProgress {
                    iteration,
                    started_at,
                    next_poll_at,
                    message: self.message.clone(),
                });
                info!(
                    "{} (check {}, next at {})",
                    self.message, iteration, next_poll_at
                );

                Ok(Step::Suspend {
                    resume_at: next_poll_at,
                    reason: SuspendReason::Waiting {
                        message: self.message.clone(),
                    },
                })
            }
        }
    }
}
