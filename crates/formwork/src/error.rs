//! Engine error types.
//!
//! Expected validation failures are never errors: they are data
//! ([`crate::event::ValidationEvent`]). The types here cover the two ways an
//! operation around the engine can fail: a validator body failing outright,
//! and a bounded wait giving up before the tree settles.

use std::time::Duration;

use thiserror::Error;

/// Failure of a validator body itself (I/O error, backend unavailable).
///
/// The engine converts this into a synthetic error event keyed
/// [`crate::event::VALIDATOR_FAILURE_KEY`] so the pass completes and the tree
/// stays usable.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Free-form failure description.
    #[error("{0}")]
    Message(String),

    /// Failure wrapping an underlying error.
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ValidatorError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// A bounded wait gave up before the control tree settled.
///
/// These stop the caller from waiting; they never abort an in-flight
/// validator. The tree keeps validating and a later `wait` can still settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The deadline expired while validation was still pending.
    #[error("wait timed out after {timeout:?}; tree still pending")]
    Timeout { timeout: Duration },

    /// The cancellation token was triggered while validation was pending.
    #[error("wait cancelled; tree still pending")]
    Cancelled,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn validator_error_displays_message() {
        let err = ValidatorError::msg("backend unavailable");
        assert_eq!(err.to_string(), "backend unavailable");
    }

    #[test]
    fn wait_error_mentions_timeout() {
        let err = WaitError::Timeout {
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }
}
