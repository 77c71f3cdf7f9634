//! Built-in validators and the higher-order combinators.
//!
//! Every builder returns a shareable [`Validator`]; keys are stable
//! constants so callers can look findings up by identity. Combinators
//! execute their inner validators through the owning control's
//! `execute_async_validation`, so supersession applies uniformly at every
//! nesting level.

use std::sync::Arc;

use formwork_reactive::tracked;
use futures::future::join_all;
use regex::Regex;

use crate::control::{Control, Validatable};
use crate::event::{combine_errors, ValidationEvent, Validator};
use crate::field::{FieldValue, FormControl};

pub const REQUIRED_VALIDATOR_KEY: &str = "required";
pub const NOT_EMPTY_OR_SPACES_VALIDATOR_KEY: &str = "notEmptyOrSpaces";
pub const NOT_CONTAIN_SPACES_VALIDATOR_KEY: &str = "notContainSpaces";
pub const PATTERN_VALIDATOR_KEY: &str = "pattern";
pub const MIN_LENGTH_VALIDATOR_KEY: &str = "minlength";
pub const MAX_LENGTH_VALIDATOR_KEY: &str = "maxlength";
pub const ABSOLUTE_LENGTH_VALIDATOR_KEY: &str = "absoluteLength";
pub const MIN_VALUE_VALIDATOR_KEY: &str = "minValue";
pub const MAX_VALUE_VALIDATOR_KEY: &str = "maxValue";
pub const COMPARE_VALIDATOR_KEY: &str = "compare";
pub const IS_EQUAL_VALIDATOR_KEY: &str = "isEqual";

/// Values with an "absent / empty" notion, used by [`required_validator`].
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Blank> Blank for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().is_none_or(Blank::is_blank)
    }
}

macro_rules! never_blank {
    ($($ty:ty),*) => {
        $(impl Blank for $ty {
            fn is_blank(&self) -> bool {
                false
            }
        })*
    };
}

never_blank!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Values with an optional textual view, used by the string validators.
pub trait TextValue {
    fn text(&self) -> Option<&str>;
}

impl TextValue for String {
    fn text(&self) -> Option<&str> {
        Some(self)
    }
}

impl TextValue for Option<String> {
    fn text(&self) -> Option<&str> {
        self.as_deref()
    }
}

/// A comparison bound: a fixed value or a getter re-read on every run.
pub enum Limit<T> {
    Value(T),
    Getter(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Limit<T> {
    pub fn getter(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::Getter(Arc::new(f))
    }

    fn resolve(&self) -> T {
        match self {
            Self::Value(v) => v.clone(),
            Self::Getter(f) => f(),
        }
    }
}

impl<T> From<T> for Limit<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

fn single(key: &str, message: &str) -> Vec<ValidationEvent> {
    vec![ValidationEvent::error(key, message)]
}

/// Error when the value is absent or empty.
pub fn required_validator<T>(message: impl Into<String>) -> Validator<FormControl<T>>
where
    T: FieldValue + Blank,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            if control.value().is_blank() {
                return Ok(single(REQUIRED_VALIDATOR_KEY, &message));
            }
            Ok(Vec::new())
        })
    })
}

/// Error when the value is absent, empty or whitespace-only.
pub fn not_empty_or_spaces_validator<T>(message: impl Into<String>) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            let value = control.value();
            if value.text().is_some_and(|t| !t.trim().is_empty()) {
                return Ok(Vec::new());
            }
            Ok(single(NOT_EMPTY_OR_SPACES_VALIDATOR_KEY, &message))
        })
    })
}

/// Error when the value contains any whitespace. Absent values pass.
pub fn not_contain_spaces_validator<T>(message: impl Into<String>) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            let value = control.value();
            match value.text() {
                Some(t) if t.chars().any(char::is_whitespace) => {
                    Ok(single(NOT_CONTAIN_SPACES_VALIDATOR_KEY, &message))
                }
                _ => Ok(Vec::new()),
            }
        })
    })
}

/// Error when the value does not match `pattern` (absent values fail too).
pub fn pattern_validator<T>(pattern: Regex, message: impl Into<String>) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        let pattern = pattern.clone();
        Box::pin(async move {
            let value = control.value();
            if value.text().is_some_and(|t| pattern.is_match(t)) {
                return Ok(Vec::new());
            }
            Ok(single(PATTERN_VALIDATOR_KEY, &message))
        })
    })
}

/// Error when the value does match `pattern`. Absent values pass.
pub fn invert_pattern_validator<T>(
    pattern: Regex,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        let pattern = pattern.clone();
        Box::pin(async move {
            let value = control.value();
            if value.text().is_some_and(|t| pattern.is_match(t)) {
                return Ok(single(PATTERN_VALIDATOR_KEY, &message));
            }
            Ok(Vec::new())
        })
    })
}

/// Error when the text is shorter than `min_length` characters. Absent and
/// empty values pass (pair with [`required_validator`] to reject them).
pub fn min_length_validator<T>(
    min_length: usize,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            let value = control.value();
            match value.text() {
                Some(t) if !t.is_empty() && t.chars().count() < min_length => {
                    Ok(single(MIN_LENGTH_VALIDATOR_KEY, &message))
                }
                _ => Ok(Vec::new()),
            }
        })
    })
}

/// Error when the text is longer than `max_length` characters.
pub fn max_length_validator<T>(
    max_length: usize,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            let value = control.value();
            match value.text() {
                Some(t) if t.chars().count() > max_length => {
                    Ok(single(MAX_LENGTH_VALIDATOR_KEY, &message))
                }
                _ => Ok(Vec::new()),
            }
        })
    })
}

/// Error when the text length differs from `length`. Absent values pass.
pub fn absolute_length_validator<T>(
    length: usize,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + TextValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        Box::pin(async move {
            let value = control.value();
            match value.text() {
                Some(t) if t.chars().count() != length => {
                    Ok(single(ABSOLUTE_LENGTH_VALIDATOR_KEY, &message))
                }
                _ => Ok(Vec::new()),
            }
        })
    })
}

/// Error when the value is below `min`.
///
/// A [`Limit::Getter`] bound is re-resolved on every run under a tracking
/// scope; signals it consults re-arm the control when they advance.
pub fn min_value_validator<T>(
    min: impl Into<Limit<T>>,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + PartialOrd,
{
    let min = Arc::new(min.into());
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let min = Arc::clone(&min);
        let message = message.clone();
        Box::pin(async move {
            let (bound, deps) = tracked(|| min.resolve());
            control.node().state().stage_deps(deps);
            if control.value() < bound {
                return Ok(single(MIN_VALUE_VALIDATOR_KEY, &message));
            }
            Ok(Vec::new())
        })
    })
}

/// Error when the value is above `max`.
///
/// A [`Limit::Getter`] bound is re-resolved on every run under a tracking
/// scope; signals it consults re-arm the control when they advance.
pub fn max_value_validator<T>(
    max: impl Into<Limit<T>>,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue + PartialOrd,
{
    let max = Arc::new(max.into());
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let max = Arc::clone(&max);
        let message = message.clone();
        Box::pin(async move {
            let (bound, deps) = tracked(|| max.resolve());
            control.node().state().stage_deps(deps);
            if control.value() > bound {
                return Ok(single(MAX_VALUE_VALIDATOR_KEY, &message));
            }
            Ok(Vec::new())
        })
    })
}

/// Error when `expression` returns `false` for the current value. The
/// general-purpose escape hatch for bespoke synchronous checks.
pub fn compare_validator<T>(
    expression: impl Fn(&T) -> bool + Send + Sync + 'static,
    message: impl Into<String>,
) -> Validator<FormControl<T>>
where
    T: FieldValue,
{
    let expression = Arc::new(expression);
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let expression = Arc::clone(&expression);
        let message = message.clone();
        Box::pin(async move {
            if expression(&control.value()) {
                return Ok(Vec::new());
            }
            Ok(single(COMPARE_VALIDATOR_KEY, &message))
        })
    })
}

/// Error when the value equals `value` (a restricted value check).
pub fn is_equal_validator<T>(value: T, message: impl Into<String>) -> Validator<FormControl<T>>
where
    T: FieldValue,
{
    let message = message.into();
    Arc::new(move |control: FormControl<T>| {
        let message = message.clone();
        let value = value.clone();
        Box::pin(async move {
            if control.value() == value {
                return Ok(single(IS_EQUAL_VALIDATOR_KEY, &message));
            }
            Ok(Vec::new())
        })
    })
}

/// Run `validators` only while `activate` holds, `else_validators`
/// otherwise. The chosen branch fans out concurrently and the events are
/// combined in declaration order.
///
/// The predicate is evaluated under a dependency-tracking scope and its
/// dependencies are recorded onto the owning control, so a change to any
/// signal it consulted re-arms the control's validation.
pub fn wrapper_activate_validation<C: Validatable>(
    activate: impl Fn(&C) -> bool + Send + Sync + 'static,
    validators: Vec<Validator<C>>,
    else_validators: Vec<Validator<C>>,
) -> Validator<C> {
    let activate = Arc::new(activate);
    Arc::new(move |control: C| {
        let activate = Arc::clone(&activate);
        let validators = validators.clone();
        let else_validators = else_validators.clone();
        Box::pin(async move {
            let (active, deps) = tracked(|| activate(&control));
            control.node().state().stage_deps(deps);

            let branch = if active { &validators } else { &else_validators };
            if branch.is_empty() {
                return Ok(Vec::new());
            }
            let runs = branch
                .iter()
                .map(|v| control.execute_async_validation(Arc::clone(v)));
            Ok(combine_errors(join_all(runs).await))
        })
    })
}

/// Run `validators` in order, stopping at the first non-empty result and
/// returning it exactly; later validators are never invoked for that run.
pub fn wrapper_sequential_check<C: Validatable>(validators: Vec<Validator<C>>) -> Validator<C> {
    Arc::new(move |control: C| {
        let validators = validators.clone();
        Box::pin(async move {
            for validator in validators {
                let events = control.execute_async_validation(validator).await;
                if !events.is_empty() {
                    return Ok(events);
                }
            }
            Ok(Vec::new())
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_covers_absent_and_empty() {
        assert!(String::new().is_blank());
        assert!(!"x".to_string().is_blank());
        assert!(Option::<String>::None.is_blank());
        assert!(Some(String::new()).is_blank());
        assert!(!Some("x".to_string()).is_blank());
        assert!(!0i64.is_blank());
    }

    #[test]
    fn limit_resolves_values_and_getters() {
        let fixed: Limit<i64> = 5.into();
        assert_eq!(fixed.resolve(), 5);
        let dynamic = Limit::getter(|| 7i64);
        assert_eq!(dynamic.resolve(), 7);
    }
}
