//! Task operators and their registration.
//!
//! A host engine looks up an [`OperatorFactory`] by task type in the
//! [`OperatorRegistry`], asks it for an [`Operator`] for each invocation
//! and runs it with a [`TaskRequest`]. The operator either completes with a
//! [`TaskResult`] or suspends with the [`TaskState`](crate::state::TaskState)
//! to pass to the next invocation.
//!
//! # Example
//!
//! ```no_run
//! use bq_wait::config::WaitConfig;
//! use bq_wait::operator::{OperatorRegistry, TaskOutcome, TaskRequest};
//!
//! let registry = OperatorRegistry::with_builtins(WaitConfig::default());
//! let request = TaskRequest::new(
//!     serde_json::json!({"_command": "proj.ds.events", "updated_after": "PT1H"}),
//!     chrono::Utc::now(),
//! );
//! match registry.run("bq_wait", request).unwrap() {
//!     TaskOutcome::Completed(result) => println!("{}", result.store_params),
//!     TaskOutcome::Suspended(s) => println!("retry at {}", s.resume_at),
//! }
//! ```

pub mod bq_wait;
pub mod params;
pub mod task;

use std::collections::HashMap;

use crate::config::WaitConfig;
use crate::error::{Result, WaitError};

pub use bq_wait::{BqWaitOperator, BqWaitOperatorFactory, WaitParams};
pub use params::ParamStore;
pub use task::{Suspension, TaskOutcome, TaskRequest, TaskResult};

/// A task implementation, created per invocation.
pub trait Operator {
    /// Run one invocation.
    fn run(&self, request: TaskRequest) -> Result<TaskOutcome>;
}

/// Creates operators of one task type.
pub trait OperatorFactory {
    /// Task type this factory handles.
    fn type_name(&self) -> &str;

    /// Create the operator for one invocation.
    fn new_operator(&self, request: &TaskRequest) -> Result<Box<dyn Operator>>;
}

/// Registry of operator factories by task type.
pub struct OperatorRegistry {
    factories: HashMap<String, Box<dyn OperatorFactory>>,
}

impl OperatorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in operators.
    pub fn with_builtins(config: WaitConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BqWaitOperatorFactory::new(config)));
        registry
    }

    /// Register a factory, replacing any factory for the same type.
    pub fn register(&mut self, factory: Box<dyn OperatorFactory>) {
        self.factories.insert(factory.type_name().to_string(), factory);
    }

    /// Get a factory by task type.
    pub fn get(&self, type_name: &str) -> Option<&dyn OperatorFactory> {
        self.factories.get(type_name).map(|f| f.as_ref())
    }

    /// Registered task types, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Create the operator for `type_name` and run one invocation.
    pub fn run(&self, type_name: &str, request: TaskRequest) -> Result<TaskOutcome> {
        let factory = self.get(type_name).ok_or_else(|| {
            WaitError::invalid_input(format!("Unknown operator type: {}", type_name))
        })?;
        factory.new_operator(&request)?.run(request)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
