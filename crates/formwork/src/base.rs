//! Validation scheduling and quiescence engine shared by all control kinds.
//!
//! Every control owns a [`ControlState`]: its error list, a trigger
//! generation, a run token, a dirty flag, recorded reactive dependencies and
//! a weak parent back-reference. The engine is pull-driven: marking a control
//! pending queues a validation pass; `wait` drives queued passes to
//! completion and then re-arms any control whose recorded dependencies
//! (activation predicates, value accessors) consulted a signal that has since
//! advanced, looping until a full cycle runs nothing new.
//!
//! Supersession is generation-based: a pass captures the trigger generation
//! at start and only replaces the error state if no new trigger arrived while
//! it was in flight. A run started later therefore always wins, independent
//! of completion order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use formwork_reactive::{DepSet, Signal};

use crate::control::ControlRef;
use crate::event::{PathErrors, ValidationEvent, ValidationEventType};

static NEXT_CONTROL_ID: AtomicU64 = AtomicU64::new(1);

/// Cause of a queued validation pass.
///
/// When several causes accumulate before the pass runs, the highest-ranked
/// one is kept: a source reload outranks an assignment, which outranks a
/// re-activation. The cause decides whether a valid settle invokes the
/// control's `on_change_valid_value` callback.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
    /// First pass after construction.
    Initialize,
    /// A descendant changed; the composite's own validators re-run.
    ChildUpdate,
    /// The child sequence of an array changed.
    Structural,
    /// A recorded activation dependency advanced.
    Reactivate,
    /// The value was assigned through the control API.
    Assign,
    /// The bound external accessor must be re-read.
    AccessorReload,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ChildUpdate => "child_update",
            Self::Structural => "structural",
            Self::Reactivate => "reactivate",
            Self::Assign => "assign",
            Self::AccessorReload => "accessor_reload",
        }
    }
}

/// Per-control engine state. Shared between a control's cloned handles and
/// referenced weakly by its children for upward pending propagation.
#[doc(hidden)]
pub struct ControlState {
    id: u64,
    errors: Mutex<Vec<ValidationEvent>>,
    trigger_gen: AtomicU64,
    run_token: AtomicU64,
    dirty: AtomicBool,
    in_flight: AtomicUsize,
    trigger: Mutex<Option<Trigger>>,
    accessor_deps: Mutex<DepSet>,
    activation_deps: Mutex<DepSet>,
    staged_deps: Mutex<DepSet>,
    signal: Signal,
    parent: Mutex<Option<Weak<ControlState>>>,
}

impl ControlState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTROL_ID.fetch_add(1, Ordering::Relaxed),
            errors: Mutex::new(Vec::new()),
            trigger_gen: AtomicU64::new(0),
            run_token: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            trigger: Mutex::new(None),
            accessor_deps: Mutex::new(DepSet::new()),
            activation_deps: Mutex::new(DepSet::new()),
            staged_deps: Mutex::new(DepSet::new()),
            signal: Signal::new(),
            parent: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn errors(&self) -> Vec<ValidationEvent> {
        match self.errors.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_errors(&self, events: Vec<ValidationEvent>) {
        match self.errors.lock() {
            Ok(mut guard) => *guard = events,
            Err(poisoned) => *poisoned.into_inner() = events,
        }
    }

    /// Own validity: no `Error`-typed event in the own error list. Warnings
    /// and informational events do not invalidate.
    pub(crate) fn own_valid(&self) -> bool {
        !self
            .errors()
            .iter()
            .any(|e| e.event_type == ValidationEventType::Error)
    }

    /// Mark this control pending for `kind` and propagate a `ChildUpdate`
    /// through the parent chain so ancestor-level validators re-run and
    /// ancestor waits observe the unsettled subtree.
    pub(crate) fn trigger(self: &Arc<Self>, kind: Trigger) {
        self.mark(kind);
        let mut up = self.parent();
        while let Some(ancestor) = up {
            ancestor.mark(Trigger::ChildUpdate);
            up = ancestor.parent();
        }
    }

    fn mark(&self, kind: Trigger) {
        let mut guard = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let merged = guard.map_or(kind, |current| current.max(kind));
        *guard = Some(merged);
        drop(guard);
        self.trigger_gen.fetch_add(1, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_trigger(&self) -> Trigger {
        let taken = match self.trigger.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        taken.unwrap_or(Trigger::ChildUpdate)
    }

    /// Put a taken trigger back, merging with any cause queued since.
    pub(crate) fn requeue(&self, kind: Trigger) {
        self.mark(kind);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.trigger_gen.load(Ordering::Acquire)
    }

    /// Start a new validator run; the returned token identifies it.
    pub(crate) fn begin_run(&self) -> u64 {
        self.run_token.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether no newer run was started since `token` was issued.
    pub(crate) fn run_is_current(&self, token: u64) -> bool {
        self.run_token.load(Ordering::Acquire) == token
    }

    pub(crate) fn enter_pass(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn leave_pass(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Pending or validating: a queued pass exists or one is in flight.
    pub(crate) fn is_busy(&self) -> bool {
        self.dirty.load(Ordering::Acquire) || self.in_flight.load(Ordering::Acquire) > 0
    }

    pub(crate) fn set_parent(&self, parent: Option<Weak<ControlState>>) {
        match self.parent.lock() {
            Ok(mut guard) => *guard = parent,
            Err(poisoned) => *poisoned.into_inner() = parent,
        }
    }

    pub(crate) fn parent(&self) -> Option<Arc<ControlState>> {
        let weak = match self.parent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        weak.and_then(|w| w.upgrade())
    }

    /// Signal announcing changes to this control's value or child sequence.
    pub(crate) fn signal(&self) -> &Signal {
        &self.signal
    }

    pub(crate) fn set_accessor_deps(&self, deps: DepSet) {
        match self.accessor_deps.lock() {
            Ok(mut guard) => *guard = deps,
            Err(poisoned) => *poisoned.into_inner() = deps,
        }
    }

    pub(crate) fn accessor_deps_stale(&self) -> bool {
        match self.accessor_deps.lock() {
            Ok(guard) => guard.is_stale(),
            Err(poisoned) => poisoned.into_inner().is_stale(),
        }
    }

    pub(crate) fn set_activation_deps(&self, deps: DepSet) {
        match self.activation_deps.lock() {
            Ok(mut guard) => *guard = deps,
            Err(poisoned) => *poisoned.into_inner() = deps,
        }
    }

    pub(crate) fn activation_deps_stale(&self) -> bool {
        match self.activation_deps.lock() {
            Ok(guard) => guard.is_stale(),
            Err(poisoned) => poisoned.into_inner().is_stale(),
        }
    }

    pub(crate) fn clear_staged_deps(&self) {
        match self.staged_deps.lock() {
            Ok(mut guard) => *guard = DepSet::new(),
            Err(poisoned) => *poisoned.into_inner() = DepSet::new(),
        }
    }

    /// Record dependencies consulted mid-pass (combinator activation
    /// predicates) for the pass to fold into its activation dependency set.
    pub(crate) fn stage_deps(&self, deps: DepSet) {
        match self.staged_deps.lock() {
            Ok(mut guard) => guard.merge(deps),
            Err(poisoned) => poisoned.into_inner().merge(deps),
        }
    }

    pub(crate) fn take_staged_deps(&self) -> DepSet {
        match self.staged_deps.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Position of a child within its parent, used to build error report paths.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildPath {
    Field(String),
    Index(usize),
}

impl ChildPath {
    pub fn join(&self, prefix: &str) -> String {
        match self {
            Self::Field(name) => {
                if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                }
            }
            Self::Index(i) => format!("{prefix}[{i}]"),
        }
    }
}

/// Engine view of a control: its state, its children and its own validation
/// pass. Implemented by every control handle; not part of the supported API.
#[doc(hidden)]
pub trait Node: Send + Sync {
    fn state(&self) -> &Arc<ControlState>;

    /// Snapshot of the current children, leaves return an empty vec.
    fn child_entries(&self) -> Vec<(ChildPath, ControlRef)>;

    /// Run this control's own validation pass (activation check, own
    /// validators, authoritative error replacement) for the given cause.
    fn run_own_pass<'a>(&'a self, trigger: Trigger)
        -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Holds a control's in-flight accounting across its own pass. If the pass
/// future is dropped mid-flight (a bounded wait gave up), the consumed
/// trigger is requeued so a later wait retries with the same cause.
struct PassGuard<'a> {
    state: &'a Arc<ControlState>,
    pending: Option<Trigger>,
}

impl<'a> PassGuard<'a> {
    fn arm(state: &'a Arc<ControlState>, trigger: Trigger) -> Self {
        state.enter_pass();
        Self {
            state,
            pending: Some(trigger),
        }
    }

    fn complete(&mut self) {
        self.pending = None;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if let Some(trigger) = self.pending.take() {
            tracing::trace!(
                control = self.state.id(),
                trigger = trigger.as_str(),
                "pass dropped mid-flight; requeued"
            );
            self.state.requeue(trigger);
        }
        self.state.leave_pass();
    }
}

/// Drive every queued pass in the subtree to completion, children before the
/// composite's own pass so composite-level validators observe settled
/// children. Loops until one sweep makes no progress. Returns whether any
/// pass ran.
pub(crate) fn drive<'a>(node: &'a dyn Node) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
    Box::pin(async move {
        let mut ran = false;
        loop {
            let mut progressed = false;
            for (_, child) in node.child_entries() {
                if drive(child.node()).await {
                    progressed = true;
                }
            }
            if node.state().take_dirty() {
                let trigger = node.state().take_trigger();
                let mut guard = PassGuard::arm(node.state(), trigger);
                node.run_own_pass(trigger).await;
                guard.complete();
                progressed = true;
            }
            if !progressed {
                break;
            }
            ran = true;
        }
        ran
    })
}

/// Re-arm any control in the subtree whose recorded dependencies consulted a
/// signal that advanced since the last pass. Returns whether anything was
/// re-armed.
pub(crate) fn rearm(node: &dyn Node) -> bool {
    let mut any = false;
    for (_, child) in node.child_entries() {
        if rearm(child.node()) {
            any = true;
        }
    }
    let state = node.state();
    if state.accessor_deps_stale() {
        tracing::trace!(control = state.id(), "accessor dependency advanced; re-arming reload");
        state.trigger(Trigger::AccessorReload);
        any = true;
    } else if state.activation_deps_stale() {
        tracing::trace!(control = state.id(), "activation dependency advanced; re-arming pass");
        state.trigger(Trigger::Reactivate);
        any = true;
    }
    any
}

/// Quiescence loop: drive queued passes, re-arm stale dependents, repeat
/// until a full cycle runs nothing, re-arms nothing and no pass is in flight
/// (a concurrent waiter may still be driving one).
///
/// Termination requires well-behaved (non-oscillating) validators; the
/// engine does not detect oscillation.
pub(crate) async fn settle(node: &dyn Node) {
    loop {
        let ran = drive(node).await;
        let rearmed = rearm(node);
        if ran || rearmed {
            continue;
        }
        if !subtree_busy(node) {
            return;
        }
        // Another waiter owns the in-flight pass; let it progress.
        tokio::task::yield_now().await;
    }
}

pub(crate) fn subtree_busy(node: &dyn Node) -> bool {
    if node.state().is_busy() {
        return true;
    }
    node.child_entries()
        .iter()
        .any(|(_, child)| subtree_busy(child.node()))
}

/// Aggregate validity: own errors free of `Error` events and every child
/// valid. Descendant errors are never merged into an ancestor's error list;
/// this predicate is the only channel for descendant invalidity.
pub(crate) fn subtree_valid(node: &dyn Node) -> bool {
    node.state().own_valid()
        && node
            .child_entries()
            .iter()
            .all(|(_, child)| child.valid())
}

/// Depth-first error collection: own errors first, then children in
/// declaration order. The root control reports under the empty path.
pub(crate) fn collect_all_errors(node: &dyn Node, prefix: &str, out: &mut Vec<PathErrors>) {
    let own = node.state().errors();
    if !own.is_empty() {
        out.push(PathErrors {
            path: prefix.to_string(),
            errors: own,
        });
    }
    for (segment, child) in node.child_entries() {
        collect_all_errors(child.node(), &segment.join(prefix), out);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn trigger_merge_keeps_strongest_cause() {
        let state = ControlState::new();
        state.trigger(Trigger::Initialize);
        state.trigger(Trigger::Assign);
        state.trigger(Trigger::Reactivate);
        assert_eq!(state.take_trigger(), Trigger::Assign);
    }

    #[test]
    fn trigger_bubbles_child_update_to_ancestors() {
        let root = ControlState::new();
        let mid = ControlState::new();
        let leaf = ControlState::new();
        mid.set_parent(Some(Arc::downgrade(&root)));
        leaf.set_parent(Some(Arc::downgrade(&mid)));

        leaf.trigger(Trigger::Assign);

        assert!(leaf.is_busy());
        assert!(mid.is_busy());
        assert!(root.is_busy());
        assert_eq!(leaf.take_trigger(), Trigger::Assign);
        assert_eq!(mid.take_trigger(), Trigger::ChildUpdate);
        assert_eq!(root.take_trigger(), Trigger::ChildUpdate);
    }

    #[test]
    fn run_token_detects_superseding_runs() {
        let state = ControlState::new();
        let first = state.begin_run();
        assert!(state.run_is_current(first));
        let second = state.begin_run();
        assert!(!state.run_is_current(first));
        assert!(state.run_is_current(second));
    }

    #[test]
    fn child_path_join_builds_report_paths() {
        assert_eq!(ChildPath::Field("field".into()).join(""), "field");
        assert_eq!(ChildPath::Field("inner".into()).join("sub"), "sub.inner");
        assert_eq!(ChildPath::Index(2).join("items"), "items[2]");
        assert_eq!(ChildPath::Index(0).join(""), "[0]");
    }
}
