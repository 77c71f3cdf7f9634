//! Validation events and the validator function contract.
//!
//! A validator receives a control handle and resolves to a list of
//! [`ValidationEvent`]s; an empty list means "no findings". Validators must
//! not fail for expected-invalid input — invalidity is data. A validator that
//! does fail (`Err`) is converted by the engine into one synthetic error
//! event keyed [`VALIDATOR_FAILURE_KEY`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ValidatorError;

/// Key of the synthetic event produced when a validator body fails.
pub const VALIDATOR_FAILURE_KEY: &str = "validatorFailure";

/// Severity of a validation event. Only `Error` events make a control
/// invalid; the other kinds are reported but do not affect `valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationEventType {
    Error,
    Warning,
    Info,
    Success,
}

impl ValidationEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Success => "success",
        }
    }
}

impl std::fmt::Display for ValidationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding produced by a validator.
///
/// `key` is a stable validator identity used for lookup; it is not
/// uniqueness-enforced, so several events may share a key on one control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationEvent {
    pub key: Option<String>,
    pub message: String,
    pub event_type: ValidationEventType,
}

impl ValidationEvent {
    pub fn new(
        key: impl Into<String>,
        message: impl Into<String>,
        event_type: ValidationEventType,
    ) -> Self {
        Self {
            key: Some(key.into()),
            message: message.into(),
            event_type,
        }
    }

    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, message, ValidationEventType::Error)
    }

    pub fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, message, ValidationEventType::Warning)
    }

    pub(crate) fn validator_failure(err: &ValidatorError) -> Self {
        Self::error(VALIDATOR_FAILURE_KEY, err.to_string())
    }
}

/// Errors of one control at one path in the tree, as reported by
/// `get_all_errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathErrors {
    pub path: String,
    pub errors: Vec<ValidationEvent>,
}

/// Resolution of a single validator run.
pub type ValidatorOutcome = Result<Vec<ValidationEvent>, ValidatorError>;

/// Boxed future returned by a validator.
pub type ValidatorFuture = Pin<Box<dyn Future<Output = ValidatorOutcome> + Send>>;

/// A shareable asynchronous validation rule over controls of type `C`.
pub type Validator<C> = Arc<dyn Fn(C) -> ValidatorFuture + Send + Sync>;

/// Build a [`Validator`] from an async closure.
pub fn validator<C, F, Fut>(f: F) -> Validator<C>
where
    C: 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ValidatorOutcome> + Send + 'static,
{
    Arc::new(move |control| Box::pin(f(control)))
}

/// Flatten batched validator results into one event list.
pub fn combine_errors(batches: Vec<Vec<ValidationEvent>>) -> Vec<ValidationEvent> {
    batches.into_iter().flatten().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn combine_errors_flattens_in_order() {
        let combined = combine_errors(vec![
            vec![ValidationEvent::error("a", "first")],
            vec![],
            vec![
                ValidationEvent::error("b", "second"),
                ValidationEvent::warning("c", "third"),
            ],
        ]);
        let keys: Vec<_> = combined.iter().filter_map(|e| e.key.as_deref()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn validator_failure_carries_failure_key() {
        let event = ValidationEvent::validator_failure(&ValidatorError::msg("boom"));
        assert_eq!(event.key.as_deref(), Some(VALIDATOR_FAILURE_KEY));
        assert_eq!(event.event_type, ValidationEventType::Error);
        assert_eq!(event.message, "boom");
    }
}
