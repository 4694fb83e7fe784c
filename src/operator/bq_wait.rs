//! The `bq_wait` operator.
//!
//! Waits until a table exists and, when `updated_after` is given, until it
//! was modified at or after `session_time + updated_after`. The result is
//! stored under `bq_wait.last_object`:
//!
//! ```yaml
//! bq_wait:
//!   last_object:
//!     table: <friendly name>
//!     last_modified_time: <epoch millis>
//! ```
//!
//! Every invocation runs from the top. The `exists` and `updated` phases
//! keep their own progress in [`TaskState`](crate::state::TaskState), so a
//! resumed task skips phases that already completed.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Operator, OperatorFactory, Suspension, TaskOutcome, TaskRequest, TaskResult};
use crate::config::WaitConfig;
use crate::credential::Credential;
use crate::error::{Result, WaitError};
use crate::lookup::{is_retryable, HttpLookupClient, LookupClient, TableSnapshot};
use crate::poll::{check_table, check_updated, PollingWaiter, RetryExecutor, RetryPredicate, Step};
use crate::resource::{FreshnessHorizon, ResourceIdentifier};

/// Task type name.
pub const TYPE_NAME: &str = "bq_wait";
/// Secret holding the credential JSON.
pub const CREDENTIAL_SECRET: &str = "gcp.credential";
/// Output namespace.
pub const OUTPUT_NAMESPACE: &str = "bq_wait";
/// Output key under [`OUTPUT_NAMESPACE`].
pub const OUTPUT_KEY: &str = "last_object";

/// Phase waiting for the table to exist.
pub const EXISTS_PHASE: &str = "exists";
/// Retry key of [`EXISTS_PHASE`].
pub const EXISTS_RETRY_KEY: &str = "poll";
/// Phase waiting for the table to be fresh enough.
pub const UPDATED_PHASE: &str = "updated";
/// Retry key of [`UPDATED_PHASE`].
pub const UPDATED_RETRY_KEY: &str = "poll_updated";

/// Parsed task parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitParams {
    /// The table specification as written.
    pub spec: String,
    pub table: ResourceIdentifier,
    pub updated_after: Option<FreshnessHorizon>,
}

impl WaitParams {
    /// Read `_command` and `updated_after` from task params.
    pub fn from_params(params: &Value) -> Result<Self> {
        let spec = match params.get("_command") {
            None | Some(Value::Null) => return Err(WaitError::invalid_input("No table specified.")),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(WaitError::invalid_input(format!(
                    "_command must be a table name string (got {})",
                    other
                )))
            }
        };
        let table = ResourceIdentifier::parse(&spec)?;

        let updated_after = match params.get("updated_after") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(FreshnessHorizon::parse(s)?),
            Some(other) => {
                return Err(WaitError::invalid_input(format!(
                    "updated_after must be ISO-8601 duration (got {})",
                    other
                )))
            }
        };

        Ok(Self {
            spec,
            table,
            updated_after,
        })
    }
}

/// Build the task output for the table that satisfied the wait.
///
/// Only `bq_wait.last_object` is reset, so other keys stored under
/// `bq_wait` by earlier tasks are kept.
pub fn output(snapshot: &TableSnapshot) -> TaskResult {
    TaskResult {
        store_params: json!({
            OUTPUT_NAMESPACE: {
                OUTPUT_KEY: {
                    "table": snapshot.display_name,
                    "last_modified_time": snapshot.last_modified.timestamp_millis(),
                }
            }
        }),
        reset_store_params: vec![vec![OUTPUT_NAMESPACE.to_string(), OUTPUT_KEY.to_string()]],
    }
}

/// Waits on a table through a [`LookupClient`].
pub struct BqWaitOperator<C> {
    client: C,
    config: WaitConfig,
    is_retryable: RetryPredicate,
}

impl<C: LookupClient> BqWaitOperator<C> {
    pub fn new(client: C, config: WaitConfig) -> Self {
        Self {
            client,
            config,
            is_retryable,
        }
    }

    /// Replace the transient-failure predicate (default [`is_retryable`]).
    pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.is_retryable = predicate;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Advance the wait by one invocation.
    pub fn run_task(&self, request: TaskRequest) -> Result<TaskOutcome> {
        let params = WaitParams::from_params(&request.params)?;
        let threshold = params
            .updated_after
            .as_ref()
            .map(|horizon| horizon.threshold(request.session_time))
            .transpose()?;

        let TaskRequest { now, mut state, .. } = request;
        let resource = params.spec.as_str();
        debug!("Checking {} at {}", resource, now);

        let exists = PollingWaiter::new(
            EXISTS_PHASE,
            format!("Target '{}' does not yet exist", resource),
            &self.config.poll,
            RetryExecutor::new(EXISTS_RETRY_KEY, resource, &self.config.retry),
        );
        let step = exists.run(&mut state, now, || {
            check_table(&self.client, &params.table, self.is_retryable)
        })?;
        let mut snapshot: TableSnapshot = match step {
            Step::Ready(snapshot) => snapshot,
            Step::Suspend { resume_at, reason } => {
                return Ok(TaskOutcome::Suspended(Suspension {
                    resume_at,
                    reason,
                    state,
                }))
            }
        };

        if let Some(threshold) = threshold {
            let updated = PollingWaiter::new(
                UPDATED_PHASE,
                format!("Target '{}' found but old", resource),
                &self.config.poll,
                RetryExecutor::new(UPDATED_RETRY_KEY, resource, &self.config.retry),
            );
            let step = updated.run(&mut state, now, || {
                check_table(&self.client, &params.table, self.is_retryable)
                    .and_then(|current| check_updated(current, threshold))
            })?;
            snapshot = match step {
                Step::Ready(current) => current,
                Step::Suspend { resume_at, reason } => {
                    return Ok(TaskOutcome::Suspended(Suspension {
                        resume_at,
                        reason,
                        state,
                    }))
                }
            };
        }

        info!(
            "Table {} is ready (last modified {})",
            resource, snapshot.last_modified
        );
        Ok(TaskOutcome::Completed(output(&snapshot)))
    }
}

impl<C: LookupClient> Operator for BqWaitOperator<C> {
    fn run(&self, request: TaskRequest) -> Result<TaskOutcome> {
        self.run_task(request)
    }
}

/// Creates [`BqWaitOperator`]s backed by the HTTP lookup client.
#[derive(Debug, Clone, Default)]
pub struct BqWaitOperatorFactory {
    config: WaitConfig,
}

impl BqWaitOperatorFactory {
    pub fn new(config: WaitConfig) -> Self {
        Self { config }
    }
}

impl OperatorFactory for BqWaitOperatorFactory {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    /// Resolve the credential and build a fresh client for this invocation.
    fn new_operator(&self, request: &TaskRequest) -> Result<Box<dyn Operator>> {
        let credential = Credential::resolve(request.secret(CREDENTIAL_SECRET))?;
        let tokens = credential.token_source(&self.config)?;
        let project = credential.project_id().map(str::to_string);
        let client = HttpLookupClient::new(&self.config, tokens, project)?;
        Ok(Box::new(BqWaitOperator::new(client, self.config.clone())))
    }
}
