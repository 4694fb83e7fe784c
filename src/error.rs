//! Error types for bq-wait operations.
//!
//! This module defines [`WaitError`], the error type surfaced at the task
//! boundary, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Every `WaitError` is fatal to the task invocation
//! - A resource that is absent or not fresh enough is *not* an error; it is
//!   reported as a suspended [`TaskOutcome`](crate::operator::TaskOutcome)
//! - Transient remote failures are retried by the retry executor and only
//!   reach this type once the retry budget is spent

use thiserror::Error;

/// Core error type for bq-wait operations.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Missing or malformed task input.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A credential could not be obtained or parsed.
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// The remote API reported a non-retryable failure.
    #[error("Remote error for '{resource}': {message}")]
    FatalRemote { resource: String, message: String },

    /// Transient remote failures outlasted the retry budget.
    #[error("Retry budget exhausted for '{resource}' ({key}) after {attempts} attempts: {last_error}")]
    RetryBudgetExhausted {
        resource: String,
        key: String,
        attempts: u32,
        last_error: String,
    },

    /// Persisted task state could not be decoded.
    #[error("Persisted task state is corrupted: {message}")]
    StateCorrupted { message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WaitError {
    /// Shorthand for an [`WaitError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for a [`WaitError::Credential`].
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }
}

/// Result type alias for bq-wait operations.
pub type Result<T> = std::result::Result<T, WaitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_displays_message() {
        let err = WaitError::invalid_input("No table specified.");
        assert!(err.to_string().contains("No table specified."));
    }

    #[test]
    fn credential_error_displays_message() {
        let err = WaitError::credential("bad json");
        let msg = err.to_string();
        assert!(msg.starts_with("Credential error"));
        assert!(msg.contains("bad json"));
    }

    #[test]
    fn fatal_remote_displays_resource_and_message() {
        let err = WaitError::FatalRemote {
            resource: "ds.tbl".into(),
            message: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ds.tbl"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn retry_budget_exhausted_displays_attempts() {
        let err = WaitError::RetryBudgetExhausted {
            resource: "ds.tbl".into(),
            key: "exists.poll".into(),
            attempts: 7,
            last_error: "HTTP 503".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ds.tbl"));
        assert!(msg.contains("exists.poll"));
        assert!(msg.contains('7'));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: WaitError = io_err.into();
        assert!(matches!(err, WaitError::Io(_)));
    }

    #[test]
    fn anyhow_error_is_transparent() {
        let err: WaitError = anyhow::anyhow!("wrapped failure").into();
        assert_eq!(err.to_string(), "wrapped failure");
    }
}
