//! `FormArray`: an ordered, mutable composite of homogeneous controls.
//!
//! Structural mutation is synchronous and atomic with respect to observers:
//! it re-links the parent reference of every affected child, marks the array
//! itself pending (its own array-level validators re-run) and leaves the
//! values of unaffected children untouched — they are not revalidated.
//! Out-of-range positions are a graceful no-op, never an error.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use formwork_reactive::{tracked, DepSet};
use serde_json::Value;

use crate::base::{ChildPath, ControlState, Node, Trigger};
use crate::control::{run_validator_batch, Activation, Control, ControlRef, Validatable};
use crate::event::Validator;

/// Construction options for a [`FormArray`].
pub struct ArrayOptions<C: Control + Clone> {
    validators: Vec<Validator<FormArray<C>>>,
    activate: Option<Activation<FormArray<C>>>,
}

impl<C: Control + Clone> Default for ArrayOptions<C> {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            activate: None,
        }
    }
}

impl<C: Control + Clone> ArrayOptions<C> {
    pub fn with_validators(mut self, validators: Vec<Validator<FormArray<C>>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_validator(mut self, validator: Validator<FormArray<C>>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_activate(mut self, activate: impl Fn(&FormArray<C>) -> bool + Send + Sync + 'static) -> Self {
        self.activate = Some(Arc::new(activate));
        self
    }
}

struct ArrayInner<C: Control + Clone> {
    state: Arc<ControlState>,
    children: Mutex<Vec<C>>,
    validators: Vec<Validator<FormArray<C>>>,
    activate: Option<Activation<FormArray<C>>>,
}

/// Ordered composite control over children of one control type.
///
/// Children are addressed by identity (the underlying control, surviving
/// handle clones), so duplicate values across distinct children are fine.
pub struct FormArray<C: Control + Clone> {
    inner: Arc<ArrayInner<C>>,
}

impl<C: Control + Clone> Clone for FormArray<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Control + Clone> FormArray<C> {
    pub fn new(children: Vec<C>, options: ArrayOptions<C>) -> Self {
        let state = ControlState::new();
        for child in &children {
            child.node().state().set_parent(Some(Arc::downgrade(&state)));
        }
        let array = Self {
            inner: Arc::new(ArrayInner {
                state,
                children: Mutex::new(children),
                validators: options.validators,
                activate: options.activate,
            }),
        };
        array.inner.state.trigger(Trigger::Initialize);
        array
    }

    fn with_children<R>(&self, f: impl FnOnce(&mut Vec<C>) -> R) -> R {
        let mut guard = match self.inner.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn adopt(&self, child: &C) {
        child
            .node()
            .state()
            .set_parent(Some(Arc::downgrade(&self.inner.state)));
    }

    fn orphan(&self, child: &C) {
        child.node().state().set_parent(None);
    }

    /// Mark the array pending after a structural change. Children keep their
    /// settled state; only array-level validators re-run.
    fn mark_structural_change(&self) {
        self.inner.state.signal().bump();
        self.inner.state.trigger(Trigger::Structural);
    }

    pub fn len(&self) -> usize {
        self.with_children(|children| children.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with_children(|children| children.is_empty())
    }

    /// Append at the tail.
    pub fn push(&self, item: C) {
        self.adopt(&item);
        self.with_children(|children| children.push(item));
        self.mark_structural_change();
    }

    /// Remove and return the tail element, if any.
    pub fn pop(&self) -> Option<C> {
        let removed = self.with_children(|children| children.pop());
        if let Some(child) = &removed {
            self.orphan(child);
            self.mark_structural_change();
        }
        removed
    }

    /// Prepend at the head.
    pub fn unshift(&self, item: C) {
        self.adopt(&item);
        self.with_children(|children| children.insert(0, item));
        self.mark_structural_change();
    }

    /// Remove and return the head element, if any.
    pub fn shift(&self) -> Option<C> {
        let removed = self.with_children(|children| {
            if children.is_empty() {
                None
            } else {
                Some(children.remove(0))
            }
        });
        if let Some(child) = &removed {
            self.orphan(child);
            self.mark_structural_change();
        }
        removed
    }

    /// Remove the element at `index`. Out-of-range indices are ignored.
    pub fn remove_at(&self, index: usize) {
        let removed = self.with_children(|children| {
            if index < children.len() {
                Some(children.remove(index))
            } else {
                None
            }
        });
        if let Some(child) = removed {
            self.orphan(&child);
            self.mark_structural_change();
        }
    }

    /// Remove `delete_count` elements at `start` (both clamped to the valid
    /// range) and insert `items` there, preserving the relative order of
    /// survivors. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<C>) -> Vec<C> {
        for item in &items {
            self.adopt(item);
        }
        let removed = self.with_children(|children| {
            let start = start.min(children.len());
            let end = (start + delete_count).min(children.len());
            children.splice(start..end, items).collect::<Vec<_>>()
        });
        for child in &removed {
            self.orphan(child);
        }
        self.mark_structural_change();
        removed
    }

    /// Insert without deleting; equivalent to `splice(index, 0, [item])`.
    pub fn insert_at(&self, index: usize, item: C) {
        self.splice(index, 0, vec![item]);
    }

    /// Remove a child by identity. Returns whether it was present.
    pub fn remove(&self, child: &C) -> bool {
        let target = child.node().state().id();
        let removed = self.with_children(|children| {
            let position = children
                .iter()
                .position(|c| c.node().state().id() == target);
            position.map(|i| children.remove(i))
        });
        match removed {
            Some(child) => {
                self.orphan(&child);
                self.mark_structural_change();
                true
            }
            None => false,
        }
    }

    /// Exchange two positions. A no-op if either index is out of range.
    pub fn swap(&self, i: usize, j: usize) {
        let swapped = self.with_children(|children| {
            if i < children.len() && j < children.len() && i != j {
                children.swap(i, j);
                true
            } else {
                false
            }
        });
        if swapped {
            self.mark_structural_change();
        }
    }

    /// Identity-based position lookup; `None` if the child is not a member.
    pub fn index_of(&self, child: &C) -> Option<usize> {
        let target = child.node().state().id();
        self.with_children(|children| {
            children
                .iter()
                .position(|c| c.node().state().id() == target)
        })
    }

    /// Handle to the child at `index`.
    pub fn get(&self, index: usize) -> Option<C> {
        self.with_children(|children| children.get(index).cloned())
    }

    /// Snapshot of the current membership, in order.
    pub fn get_controls(&self) -> Vec<C> {
        self.with_children(|children| children.clone())
    }

    /// Snapshot of the current membership as shared control handles.
    pub fn all_controls(&self) -> Vec<ControlRef> {
        self.with_children(|children| {
            children
                .iter()
                .map(|c| Arc::new(c.clone()) as ControlRef)
                .collect()
        })
    }

    /// Iterate over a snapshot of the current membership. Mutations after
    /// the call do not affect the iteration.
    pub fn iter(&self) -> impl Iterator<Item = C> {
        self.get_controls().into_iter()
    }

    pub fn map<R>(&self, f: impl FnMut(&C) -> R) -> Vec<R> {
        self.with_children(|children| children.iter().map(f).collect())
    }

    pub fn some(&self, mut predicate: impl FnMut(&C) -> bool) -> bool {
        self.with_children(|children| children.iter().any(|c| predicate(c)))
    }
}

impl<C: Control + Clone> Node for FormArray<C> {
    fn state(&self) -> &Arc<ControlState> {
        &self.inner.state
    }

    fn child_entries(&self) -> Vec<(ChildPath, ControlRef)> {
        self.with_children(|children| {
            children
                .iter()
                .enumerate()
                .map(|(i, c)| (ChildPath::Index(i), Arc::new(c.clone()) as ControlRef))
                .collect()
        })
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
                    "array pass superseded; result discarded"
                );
                return;
            }
            state.set_errors(events);
            state.set_activation_deps(activation_deps);
        })
    }
}

impl<C: Control + Clone> Control for FormArray<C> {
    fn node(&self) -> &dyn Node {
        self
    }

    fn get_value(&self) -> Value {
        Value::Array(self.with_children(|children| children.iter().map(|c| c.get_value()).collect()))
    }
}

impl<C: Control + Clone> Validatable for FormArray<C> {}
