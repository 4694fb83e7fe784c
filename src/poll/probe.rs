//! Single-shot poll steps.
//!
//! A poll step calls the lookup client at most once and reports a tagged
//! [`Probe`] instead of raising. Whether a lookup failure is worth
//! retrying is decided here, by the predicate the caller passes in.

use chrono::{DateTime, Utc};

use crate::lookup::{LookupClient, LookupError, TableSnapshot};
use crate::resource::ResourceIdentifier;

/// Decides whether a lookup failure is transient.
pub type RetryPredicate = fn(&LookupError) -> bool;

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The condition holds.
    Satisfied(T),
    /// The condition does not hold yet.
    NotSatisfied,
    /// The lookup failed but may succeed if tried again.
    RetryableFailure(LookupError),
    /// The lookup failed for good.
    FatalFailure(LookupError),
}

impl<T> Probe<T> {
    /// Tag a raw lookup result. `Ok(None)` means "not there yet".
    pub fn classify(
        result: Result<Option<T>, LookupError>,
        is_retryable: RetryPredicate,
    ) -> Self {
        match result {
            Ok(Some(value)) => Probe::Satisfied(value),
            Ok(None) => Probe::NotSatisfied,
            Err(e) if is_retryable(&e) => Probe::RetryableFailure(e),
            Err(e) => Probe::FatalFailure(e),
        }
    }

    /// Chain a further check onto a satisfied probe.
    pub fn and_then<U, F>(self, f: F) -> Probe<U>
    where
        F: FnOnce(T) -> Probe<U>,
    {
        match self {
            Probe::Satisfied(value) => f(value),
            Probe::NotSatisfied => Probe::NotSatisfied,
            Probe::RetryableFailure(e) => Probe::RetryableFailure(e),
            Probe::FatalFailure(e) => Probe::FatalFailure(e),
        }
    }
}

/// Existence check: does the table (or the named partition) exist?
///
/// The metadata API answers a partition-decorated lookup with the parent
/// table, so a partition-qualified identifier with zero rows counts as
/// missing.
pub fn check_table(
    client: &dyn LookupClient,
    id: &ResourceIdentifier,
    is_retryable: RetryPredicate,
) -> Probe<TableSnapshot> {
    Probe::classify(client.get_table(id), is_retryable).and_then(|snapshot| {
        if id.is_partition_qualified() && snapshot.num_rows == 0 {
            Probe::NotSatisfied
        } else {
            Probe::Satisfied(snapshot)
        }
    })
}

/// Freshness check: was the table modified at or after `threshold`?
pub fn check_updated(snapshot: TableSnapshot, threshold: DateTime<Utc>) -> Probe<TableSnapshot> {
    if snapshot.last_modified < threshold {
        Probe::NotSatisfied
    } else {
        Probe::Satisfied(snapshot)
    }
}
