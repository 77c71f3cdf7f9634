#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Tests for the quiescence protocol: bounded waits, cancellation, recovery
//! after a given-up wait, and cross-control re-arm cascades.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use formwork::control::{Control, ControlRef};
use formwork::error::WaitError;
use formwork::event::validator;
use formwork::field::{FieldOptions, FormControl};
use formwork::group::{FormGroup, GroupOptions};
use formwork::validators::required_validator;
use formwork::wait::{wait_cancellable, wait_with_timeout};
use tokio_util::sync::CancellationToken;

/// A field whose validator hangs forever while the value is `"slow"`.
fn sometimes_hanging_field(initial: &str) -> FormControl<String> {
    FormControl::new(
        initial.to_string(),
        FieldOptions::default().with_validator(validator(|c: FormControl<String>| async move {
            if c.peek_value() == "slow" {
                futures::future::pending::<()>().await;
            }
            Ok(Vec::new())
        })),
    )
}

// ── bounded waits ──

#[tokio::test]
async fn bounded_wait_resolves_on_a_settling_tree() {
    let field = sometimes_hanging_field("fast");
    let result = wait_with_timeout(&field, Duration::from_secs(5)).await;
    assert_eq!(result, Ok(()));
    assert!(!field.pending());
}

#[tokio::test]
async fn bounded_wait_times_out_on_a_hanging_validator() {
    let field = sometimes_hanging_field("slow");
    let result = wait_with_timeout(&field, Duration::from_millis(50)).await;
    assert_eq!(
        result,
        Err(WaitError::Timeout {
            timeout: Duration::from_millis(50)
        })
    );
    assert!(field.pending());
}

#[tokio::test]
async fn tree_recovers_after_a_timed_out_wait() {
    let field = sometimes_hanging_field("slow");
    let timed_out = wait_with_timeout(&field, Duration::from_millis(50)).await;
    assert!(timed_out.is_err());

    // The given-up pass is requeued; a later assignment supersedes it and the
    // tree settles normally.
    field.set_value("fast".into());
    field.wait().await;
    assert!(!field.pending());
    assert!(field.valid());
}

// ── cancellation ──

#[tokio::test]
async fn cancellable_wait_stops_when_the_token_fires() {
    let field = sometimes_hanging_field("slow");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let ((), result) = tokio::join!(
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        },
        wait_cancellable(&field, &cancel),
    );
    assert_eq!(result, Err(WaitError::Cancelled));
    assert!(field.pending());
}

#[tokio::test]
async fn cancellable_wait_resolves_normally_without_cancellation() {
    let field = sometimes_hanging_field("fast");
    let cancel = CancellationToken::new();
    let result = wait_cancellable(&field, &cancel).await;
    assert_eq!(result, Ok(()));
}

// ── re-arm cascades ──

#[tokio::test]
async fn settled_value_rearms_a_dependent_activation_exactly_once() {
    let toggle = FormControl::new(false, FieldOptions::default());
    let gate = toggle.clone();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let email = FormControl::new(
        String::new(),
        FieldOptions::default()
            .with_activate(move |_| gate.value())
            .with_validator(validator(move |_c: FormControl<String>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![formwork::event::ValidationEvent::error(
                        "required", "required",
                    )])
                }
            })),
    );
    let form = FormGroup::new(
        [
            ("subscribed", Arc::new(toggle.clone()) as ControlRef),
            ("email", Arc::new(email.clone()) as ControlRef),
        ],
        GroupOptions::default(),
    );
    form.wait().await;
    // Inactive on initialize, so the validator never ran.
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(form.valid());

    // One wait covers the cascade: the toggle settles, the email control's
    // activation dependency goes stale, and its pass re-arms and runs once.
    toggle.set_value(true);
    form.wait().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!form.valid());
    assert!(!email.valid());

    toggle.set_value(false);
    form.wait().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(form.valid());
}

#[tokio::test]
async fn wait_on_a_leaf_covers_its_own_dependencies_only() {
    let name = FormControl::new(
        "x".to_string(),
        FieldOptions::default().with_validator(required_validator("required")),
    );
    name.wait().await;
    assert!(name.valid());

    name.set_value(String::new());
    name.wait().await;
    assert!(!name.valid());
}
