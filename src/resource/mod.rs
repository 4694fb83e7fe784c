//! Task input parsing for the watched table resource.
//!
//! - [`ResourceIdentifier`] - `dataset.table` or `project.dataset.table`
//! - [`FreshnessHorizon`] - ISO-8601 duration added to the session time
//!
//! # Example
//!
//! ```
//! use bq_wait::resource::{FreshnessHorizon, ResourceIdentifier};
//!
//! let id = ResourceIdentifier::parse("analytics.events$20240101").unwrap();
//! assert_eq!(id.dataset(), "analytics");
//! assert!(id.is_partition_qualified());
//!
//! let horizon = FreshnessHorizon::parse("PT1H").unwrap();
//! assert_eq!(horizon.duration().num_minutes(), 60);
//! ```

pub mod horizon;
pub mod identifier;

pub use horizon::FreshnessHorizon;
pub use identifier::{ResourceIdentifier, PARTITION_DECORATOR};
