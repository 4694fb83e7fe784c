//! Remote table metadata lookup.
//!
//! The wait logic only depends on the [`LookupClient`] trait: given a
//! [`ResourceIdentifier`] it returns the current [`TableSnapshot`], `None`
//! when the table does not exist, or a [`LookupError`] carrying a
//! structured [`RemoteErrorKind`]. Retry decisions are made from the kind
//! alone via [`is_retryable`], never from backend-specific error types.
//!
//! [`HttpLookupClient`] is the REST implementation used in production.

pub mod http;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::ResourceIdentifier;

pub use http::HttpLookupClient;

/// Metadata observed for an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Human-readable table name.
    pub display_name: String,
    /// Row count reported by the API.
    pub num_rows: u64,
    /// Last modification time of the table.
    pub last_modified: DateTime<Utc>,
}

/// Classification of a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    RateLimited,
    ServerError,
    Timeout,
    Connection,
    PermissionDenied,
    Unauthenticated,
    BadRequest,
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::RateLimited => "rate limited",
            RemoteErrorKind::ServerError => "server error",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Connection => "connection error",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::Unauthenticated => "unauthenticated",
            RemoteErrorKind::BadRequest => "bad request",
            RemoteErrorKind::Other => "error",
        };
        f.write_str(name)
    }
}

/// Error returned by a [`LookupClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct LookupError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl LookupError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Whether a failed lookup is worth retrying.
pub fn is_retryable(error: &LookupError) -> bool {
    matches!(
        error.kind,
        RemoteErrorKind::RateLimited
            | RemoteErrorKind::ServerError
            | RemoteErrorKind::Timeout
            | RemoteErrorKind::Connection
    )
}

/// Source of table metadata.
pub trait LookupClient {
    /// Fetch current metadata for `id`, or `Ok(None)` if it does not exist.
    fn get_table(&self, id: &ResourceIdentifier) -> Result<Option<TableSnapshot>, LookupError>;
}

impl<T: LookupClient + ?Sized> LookupClient for Box<T> {
    fn get_table(&self, id: &ResourceIdentifier) -> Result<Option<TableSnapshot>, LookupError> {
        (**self).get_table(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        for kind in [
            RemoteErrorKind::RateLimited,
            RemoteErrorKind::ServerError,
            RemoteErrorKind::Timeout,
            RemoteErrorKind::Connection,
        ] {
            assert!(is_retryable(&LookupError::new(kind, "x")), "{:?}", kind);
        }
    }

    #[test]
    fn permanent_kinds_are_not_retryable() {
        for kind in [
            RemoteErrorKind::PermissionDenied,
            RemoteErrorKind::Unauthenticated,
            RemoteErrorKind::BadRequest,
            RemoteErrorKind::Other,
        ] {
            assert!(!is_retryable(&LookupError::new(kind, "x")), "{:?}", kind);
        }
    }

    #[test]
    fn lookup_error_display_includes_kind() {
        let err = LookupError::new(RemoteErrorKind::PermissionDenied, "Access Denied: Table p:d.t");
        assert_eq!(
            err.to_string(),
            "permission denied: Access Denied: Table p:d.t"
        );
    }
}
