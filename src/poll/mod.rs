//! Polling and retry machinery.
//!
//! Layers, innermost first:
//!
//! - [`probe`]: single-shot poll steps returning a tagged [`Probe`]
//! - [`retry`]: [`RetryExecutor`], backoff for transient lookup failures
//! - [`waiter`]: [`PollingWaiter`], suspension while a condition is unmet
//! - [`backoff`]: [`BackoffPolicy`] shared by both
//!
//! None of these sleep. Anything that has to wait comes back as
//! [`Step::Suspend`] with the instant the task should be invoked again.

pub mod backoff;
pub mod probe;
pub mod retry;
pub mod waiter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use backoff::BackoffPolicy;
pub use probe::{check_table, check_updated, Probe, RetryPredicate};
pub use retry::RetryExecutor;
pub use waiter::PollingWaiter;

/// Result of advancing a phase by one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// The phase produced its value.
    Ready(T),
    /// Invoke the task again at or after `resume_at`.
    Suspend {
        resume_at: DateTime<Utc>,
        reason: SuspendReason,
    },
}

/// Why a task is suspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspendReason {
    /// The awaited condition does not hold yet.
    Waiting { message: String },
    /// A transient lookup failure is being retried.
    Retrying { attempt: u32, error: String },
}
