//! `FormControl`: the value-holding leaf of the validation tree.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use formwork_reactive::{tracked, DepSet};
use serde::Serialize;
use serde_json::Value;

use crate::base::{ChildPath, ControlState, Node, Trigger};
use crate::control::{run_validator_batch, Activation, Control, ControlRef, Validatable};
use crate::event::{ValidationEventType, Validator};

/// Value types a `FormControl` can hold.
pub trait FieldValue: Clone + PartialEq + Send + Sync + Serialize + 'static {}

impl<T: Clone + PartialEq + Send + Sync + Serialize + 'static> FieldValue for T {}

/// Zero-argument value source re-read whenever a signal it consulted
/// advances.
pub type Accessor<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Construction options for a [`FormControl`].
pub struct FieldOptions<T: FieldValue> {
    validators: Vec<Validator<FormControl<T>>>,
    on_change_valid_value: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    call_setter_on_initialize: bool,
    activate: Option<Activation<FormControl<T>>>,
}

impl<T: FieldValue> Default for FieldOptions<T> {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            on_change_valid_value: None,
            call_setter_on_initialize: false,
            activate: None,
        }
    }
}

impl<T: FieldValue> FieldOptions<T> {
    pub fn with_validators(mut self, validators: Vec<Validator<FormControl<T>>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_validator(mut self, validator: Validator<FormControl<T>>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Callback invoked with the settled value after a validation pass
    /// completes valid and non-superseded. Not invoked for the initializing
    /// or accessor-reloaded value unless
    /// [`with_call_setter_on_initialize`](Self::with_call_setter_on_initialize)
    /// is set.
    pub fn with_on_change_valid_value(mut self, setter: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_change_valid_value = Some(Arc::new(setter));
        self
    }

    pub fn with_call_setter_on_initialize(mut self, call: bool) -> Self {
        self.call_setter_on_initialize = call;
        self
    }

    /// Activation predicate; when it returns `false`, the control's own
    /// validators are skipped and its errors settle empty. Signals read
    /// inside the predicate are recorded so their changes re-arm the pass.
    pub fn with_activate(mut self, activate: impl Fn(&FormControl<T>) -> bool + Send + Sync + 'static) -> Self {
        self.activate = Some(Arc::new(activate));
        self
    }
}

struct FieldInner<T: FieldValue> {
    state: Arc<ControlState>,
    value: RwLock<T>,
    accessor: Option<Accessor<T>>,
    validators: Vec<Validator<FormControl<T>>>,
    on_change_valid_value: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    call_setter_on_initialize: bool,
    activate: Option<Activation<FormControl<T>>>,
}

/// Leaf control owning a single value, either held directly or derived from
/// a bound external accessor.
///
/// Handles are cheap clones sharing one underlying control; identity follows
/// the underlying control, not the handle.
pub struct FormControl<T: FieldValue> {
    inner: Arc<FieldInner<T>>,
}

impl<T: FieldValue> Clone for FormControl<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: FieldValue> FormControl<T> {
    /// Create a control holding `initial` directly.
    pub fn new(initial: T, options: FieldOptions<T>) -> Self {
        Self::build(initial, None, options)
    }

    /// Create a control bound to an external accessor. The accessor is
    /// re-read (under dependency tracking) whenever a signal it consulted
    /// advances; a signalled re-read always re-triggers validation, with no
    /// value identity comparison.
    pub fn from_accessor(accessor: impl Fn() -> T + Send + Sync + 'static, options: FieldOptions<T>) -> Self {
        let accessor: Accessor<T> = Arc::new(accessor);
        let initial = accessor();
        Self::build(initial, Some(accessor), options)
    }

    fn build(initial: T, accessor: Option<Accessor<T>>, options: FieldOptions<T>) -> Self {
        let control = Self {
            inner: Arc::new(FieldInner {
                state: ControlState::new(),
                value: RwLock::new(initial),
                accessor,
                validators: options.validators,
                on_change_valid_value: options.on_change_valid_value,
                call_setter_on_initialize: options.call_setter_on_initialize,
                activate: options.activate,
            }),
        };
        control.inner.state.trigger(Trigger::Initialize);
        control
    }

    /// Current value, registering a dependency in the ambient tracking scope
    /// (activation predicates rely on this).
    pub fn value(&self) -> T {
        self.inner.state.signal().track();
        self.peek_value()
    }

    /// Current value without dependency registration.
    pub fn peek_value(&self) -> T {
        match self.inner.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Assign a new value, mark the control pending and notify the parent
    /// chain that the tree is unsettled.
    pub fn set_value(&self, value: T) {
        self.store(value);
        self.inner.state.trigger(Trigger::Assign);
    }

    fn store(&self, value: T) {
        match self.inner.value.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
        self.inner.state.signal().bump();
    }
}

impl<T: FieldValue> Node for FormControl<T> {
    fn state(&self) -> &Arc<ControlState> {
        &self.inner.state
    }

    fn child_entries(&self) -> Vec<(ChildPath, ControlRef)> {
        Vec::new()
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

            // Accessor-bound controls re-read their source on init and
            // reload passes; assignment and re-activation keep the held
            // value.
            if matches!(trigger, Trigger::Initialize | Trigger::AccessorReload) {
                if let Some(accessor) = &this.inner.accessor {
                    let (value, deps) = tracked(|| accessor());
                    this.store(value);
                    state.set_accessor_deps(deps);
                }
            }

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
                    "validation pass superseded; result discarded"
                );
                return;
            }

            let settled_valid = !events
                .iter()
                .any(|e| e.event_type == ValidationEventType::Error);
            state.set_errors(events);
            state.set_activation_deps(activation_deps);

            if settled_valid {
                if let Some(setter) = &this.inner.on_change_valid_value {
                    let fire = match trigger {
                        Trigger::Assign | Trigger::Reactivate => true,
                        Trigger::Initialize | Trigger::AccessorReload => {
                            this.inner.call_setter_on_initialize
                        }
                        Trigger::Structural | Trigger::ChildUpdate => false,
                    };
                    if fire {
                        setter(&this.peek_value());
                    }
                }
            }
        })
    }
}

impl<T: FieldValue> Control for FormControl<T> {
    fn node(&self) -> &dyn Node {
        self
    }

    fn get_value(&self) -> Value {
        serde_json::to_value(self.peek_value()).unwrap_or(Value::Null)
    }
}

impl<T: FieldValue> Validatable for FormControl<T> {}
