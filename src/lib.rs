//! bq-wait - Resumable wait for a BigQuery table to exist and be fresh.
//!
//! The `bq_wait` operator blocks a workflow task until a table exists and,
//! optionally, was modified after the session time plus a horizon. It never
//! sleeps: every invocation either completes or suspends with the state the
//! host must pass back on the next invocation.
//!
//! # Modules
//!
//! - [`config`] - Polling policies and API endpoints
//! - [`credential`] - Credential parsing and bearer token sources
//! - [`error`] - Error types and result aliases
//! - [`logging`] - Tracing subscriber setup
//! - [`lookup`] - Table metadata lookup and error classification
//! - [`operator`] - Task protocol, the `bq_wait` operator and registry
//! - [`poll`] - Poll steps, retry executor and polling waiter
//! - [`resource`] - Table identifiers and freshness horizons
//! - [`state`] - Resumable task state and its file store
//!
//! # Example
//!
//! ```
//! use bq_wait::resource::{FreshnessHorizon, ResourceIdentifier};
//!
//! let table = ResourceIdentifier::parse("proj.ds.events").unwrap();
//! assert_eq!(table.dataset(), "ds");
//!
//! let horizon = FreshnessHorizon::parse("PT1H").unwrap();
//! assert_eq!(horizon.duration(), chrono::TimeDelta::hours(1));
//! ```
//!
//! For multi-invocation flows, see the integration tests.

pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod operator;
pub mod poll;
pub mod resource;
pub mod state;

pub use error::{Result, WaitError};
