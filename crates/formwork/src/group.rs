//! `FormGroup`: a keyed composite with a field set fixed at construction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use formwork_reactive::{tracked, DepSet};
use serde_json::Value;

use crate::base::{ChildPath, ControlState, Node, Trigger};
use crate::control::{run_validator_batch, Activation, Control, ControlRef, Validatable};
use crate::event::Validator;

/// Construction options for a [`FormGroup`].
#[derive(Default)]
pub struct GroupOptions {
    validators: Vec<Validator<FormGroup>>,
    activate: Option<Activation<FormGroup>>,
}

impl GroupOptions {
    pub fn with_validators(mut self, validators: Vec<Validator<FormGroup>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_validator(mut self, validator: Validator<FormGroup>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_activate(mut self, activate: impl Fn(&FormGroup) -> bool + Send + Sync + 'static) -> Self {
        self.activate = Some(Arc::new(activate));
        self
    }
}

struct GroupInner {
    state: Arc<ControlState>,
    children: Vec<(String, ControlRef)>,
    validators: Vec<Validator<FormGroup>>,
    activate: Option<Activation<FormGroup>>,
}

/// Keyed composite control. The name→child mapping is bound at construction
/// and never mutated; declaration order is preserved for value snapshots and
/// error reports.
///
/// A group's own errors come from its own validators only; child errors are
/// visible through [`Control::valid`] and [`Control::get_all_errors`], never
/// merged into the group's own list.
#[derive(Clone)]
pub struct FormGroup {
    inner: Arc<GroupInner>,
}

impl FormGroup {
    pub fn new<N, I>(children: I, options: GroupOptions) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, ControlRef)>,
    {
        let children: Vec<(String, ControlRef)> = children
            .into_iter()
            .map(|(name, child)| (name.into(), child))
            .collect();
        let state = ControlState::new();
        for (_, child) in &children {
            child.node().state().set_parent(Some(Arc::downgrade(&state)));
        }
        let group = Self {
            inner: Arc::new(GroupInner {
                state,
                children,
                validators: options.validators,
                activate: options.activate,
            }),
        };
        group.inner.state.trigger(Trigger::Initialize);
        group
    }

    /// Child control by field name.
    pub fn control(&self, name: &str) -> Option<ControlRef> {
        self.inner
            .children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, child)| Arc::clone(child))
    }

    /// All children in declaration order.
    pub fn controls(&self) -> &[(String, ControlRef)] {
        &self.inner.children
    }
}

impl Node for FormGroup {
    fn state(&self) -> &Arc<ControlState> {
        &self.inner.state
    }

    fn child_entries(&self) -> Vec<(ChildPath, ControlRef)> {
        self.inner
            .children
            .iter()
            .map(|(name, child)| (ChildPath::Field(name.clone()), Arc::clone(child)))
            .collect()
    }

    fn run_own_pass<'a>(
        &'a self,
        trigger: Trigger,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        let this = self.clone();
        Box::pin(async move {
            let state = Arc::clone(&this.inner.state);
            let generation = state.generation();
            state.clear_staged_deps();

            let mut activation_deps = DepSet::new();
            let active = match &this.inner.activate {
                Some(predicate) => {
                    let (active, deps) = tracked(|| predicate(&this));
                    activation_deps.merge(deps);
                    active
                }
                None => true,
            };

            let events = if active {
                run_validator_batch(&this, &this.inner.validators).await
            } else {
                Vec::new()
            };

            activation_deps.merge(state.take_staged_deps());

            if state.generation() != generation {
                tracing::trace!(
                    control = state.id(),
                    trigger = trigger.as_str(),
                    "group pass superseded; result discarded"
                );
                return;
            }
            state.set_errors(events);
            state.set_activation_deps(activation_deps);
        })
    }
}

impl Control for FormGroup {
    fn node(&self) -> &dyn Node {
        self
    }

    fn get_value(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .inner
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.get_value()))
            .collect();
        Value::Object(map)
    }
}

impl Validatable for FormGroup {}
