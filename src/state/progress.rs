//! Phase-keyed progress records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaitError};
use crate::lookup::RemoteErrorKind;

/// Persisted progress of one task invocation chain, keyed by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskState {
    phases: BTreeMap<String, PhaseProgress>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, key: &str) -> Option<&PhaseProgress> {
        self.phases.get(key)
    }

    /// Progress for `key`, created empty on first use.
    pub fn phase_mut(&mut self, key: &str) -> &mut PhaseProgress {
        self.phases.entry(key.to_string()).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.values().all(PhaseProgress::is_empty)
    }
}

/// Progress of a single phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    /// Set while the phase's condition has not been met yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<WaitProgress>,

    /// Retry executor progress, keyed by retry key (`poll`, `poll_updated`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<String, RetryProgress>,

    /// Result of a satisfied phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl PhaseProgress {
    pub fn is_empty(&self) -> bool {
        self.waiting.is_none() && self.retries.is_empty() && self.result.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Decode the memoised result, if the phase completed.
    pub fn completed<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.result
            .as_ref()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| WaitError::StateCorrupted {
                    message: format!("phase result cannot be decoded: {}", e),
                })
            })
            .transpose()
    }

    /// Record the phase as satisfied and drop its wait/retry bookkeeping.
    pub fn complete<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| WaitError::StateCorrupted {
            message: format!("phase result cannot be encoded: {}", e),
        })?;
        self.waiting = None;
        self.retries.clear();
        self.result = Some(value);
        Ok(())
    }
}

/// Polling waiter progress: how often the condition was found unmet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitProgress {
    /// Number of unsatisfied checks so far.
    pub iteration: u32,
    /// When the first unsatisfied check happened.
    pub started_at: DateTime<Utc>,
    /// Do not check again before this instant.
    pub next_poll_at: DateTime<Utc>,
    /// Operator-facing description of what is awaited.
    pub message: String,
}

/// Retry executor progress for one retry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryProgress {
    /// Retryable failures in the current streak.
    pub attempts: u32,
    /// When the current streak started.
    pub first_failure_at: DateTime<Utc>,
    /// Do not retry before this instant.
    pub retry_not_before: DateTime<Utc>,
    /// Classification of the last failure.
    pub last_error_kind: RemoteErrorKind,
    /// Message of the last failure.
    pub last_error: String,
}
