//! The shared control capability set.
//!
//! [`Control`] is the object-safe surface every node in the validation tree
//! exposes: error access, aggregate validity, value snapshots and the
//! quiescence protocol. [`Validatable`] adds the typed async validation
//! entry point combinators run through.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::base::{self, Node};
use crate::event::{combine_errors, PathErrors, ValidationEvent, Validator};

/// Shared handle to a control of any kind.
pub type ControlRef = Arc<dyn Control>;

/// Per-control activation predicate. When it returns `false`, the control's
/// own validators are skipped for the pass and its own errors settle empty;
/// children of a composite are still evaluated.
pub type Activation<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// A node in the validation tree: leaf (`FormControl`), keyed composite
/// (`FormGroup`) or ordered composite (`FormArray`).
#[async_trait]
pub trait Control: Send + Sync + 'static {
    #[doc(hidden)]
    fn node(&self) -> &dyn Node;

    /// This control's own errors: exactly the result of the most recently
    /// completed, non-superseded validation pass. Descendant errors are
    /// never included.
    fn errors(&self) -> Vec<ValidationEvent> {
        self.node().state().errors()
    }

    /// Whether this control's own error list is non-empty. Unlike [`valid`],
    /// descendants are not consulted.
    ///
    /// [`valid`]: Control::valid
    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Aggregate validity: own errors free of `Error` events and every
    /// descendant valid.
    fn valid(&self) -> bool {
        base::subtree_valid(self.node())
    }

    /// Whether this control or any descendant has a queued or in-flight
    /// validation pass.
    fn pending(&self) -> bool {
        base::subtree_busy(self.node())
    }

    /// Snapshot of the current value tree, with no validation side effects.
    fn get_value(&self) -> Value;

    /// Depth-first collection of every control in the subtree with non-empty
    /// errors, paired with its path (`subform.field`, `items[2]`; the root
    /// reports under the empty path). Children appear in declaration order.
    fn get_all_errors(&self) -> Vec<PathErrors> {
        let mut out = Vec::new();
        base::collect_all_errors(self.node(), "", &mut out);
        out
    }

    /// Resolve once this control and every descendant has no validation pass
    /// in flight and no re-trigger queued, including cascades where one
    /// control's settled value re-arms another control's activation
    /// condition. A validator that never resolves stalls this indefinitely.
    async fn wait(&self) {
        base::settle(self.node()).await;
    }
}

/// Typed validation entry point for a concrete control kind.
///
/// Combinators execute their inner validators through
/// [`execute_async_validation`] so supersession applies uniformly at every
/// nesting level.
///
/// [`execute_async_validation`]: Validatable::execute_async_validation
#[async_trait]
pub trait Validatable: Control + Clone + Sized {
    /// Run one validator against this control.
    ///
    /// Starts a new run (bumping the control's run token), awaits the
    /// validator and always returns the literal computed events — callers
    /// such as the sequential combinator read the result even when the run
    /// was superseded. A superseded run never contributes to the
    /// authoritative error state; that replacement happens at pass
    /// granularity. A failed validator (`Err`) resolves to one synthetic
    /// error event keyed [`crate::event::VALIDATOR_FAILURE_KEY`].
    async fn execute_async_validation(&self, validator: Validator<Self>) -> Vec<ValidationEvent> {
        let state = Arc::clone(self.node().state());
        let token = state.begin_run();
        let outcome = validator(self.clone()).await;
        let events = match outcome {
            Ok(events) => events,
            Err(err) => {
                tracing::debug!(
                    control = state.id(),
                    error = %err,
                    "validator failed; converting to synthetic error event"
                );
                vec![ValidationEvent::validator_failure(&err)]
            }
        };
        if !state.run_is_current(token) {
            tracing::trace!(control = state.id(), token, "validator run superseded");
        }
        events
    }
}

/// Fan out a control's validators concurrently and combine their events in
/// declaration order.
pub(crate) async fn run_validator_batch<C: Validatable>(
    control: &C,
    validators: &[Validator<C>],
) -> Vec<ValidationEvent> {
    if validators.is_empty() {
        return Vec::new();
    }
    let runs = validators
        .iter()
        .map(|v| control.execute_async_validation(Arc::clone(v)));
    combine_errors(join_all(runs).await)
}
