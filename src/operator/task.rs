//! Invocation protocol between the host engine and an operator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::poll::SuspendReason;
use crate::state::TaskState;

/// One invocation of a task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Task parameters as configured in the workflow.
    pub params: Value,
    /// Secrets visible to the task, by key.
    pub secrets: BTreeMap<String, String>,
    /// Logical start time of the workflow session.
    pub session_time: DateTime<Utc>,
    /// Wall-clock time of this invocation.
    pub now: DateTime<Utc>,
    /// State persisted by earlier invocations of the same task.
    pub state: TaskState,
}

impl TaskRequest {
    /// A first invocation happening right now.
    pub fn new(params: Value, session_time: DateTime<Utc>) -> Self {
        Self {
            params,
            secrets: BTreeMap::new(),
            session_time,
            now: Utc::now(),
            state: TaskState::new(),
        }
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    /// Pin the invocation clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }
}

/// Output parameters of a completed task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Parameters to store, merged into the session's params.
    pub store_params: Value,
    /// Parameter paths to remove before `store_params` is merged.
    pub reset_store_params: Vec<Vec<String>>,
}

/// The task is not finished; run it again later with `state`.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    /// Earliest instant the next invocation is useful.
    pub resume_at: DateTime<Utc>,
    pub reason: SuspendReason,
    /// State to hand back on the next invocation.
    pub state: TaskState,
}

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskResult),
    Suspended(Suspension),
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            TaskOutcome::Completed(result) => Some(result),
            TaskOutcome::Suspended(_) => None,
        }
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            TaskOutcome::Completed(_) => None,
            TaskOutcome::Suspended(suspension) => Some(suspension),
        }
    }
}
