//! formwork-reactive: minimal reactive primitives for the formwork engine.
//!
//! Provides the three capabilities the validation engine requires from its
//! reactive collaborator:
//! - an observable cell (`Var<T>`) whose reads register dependencies,
//! - a version counter (`Signal`) whose writes mark dependents stale,
//! - a batching context (`batch`) grouping several writes into one version
//!   step per signal.
//!
//! Dependency tracking is pull-based: a caller evaluates a closure under
//! [`tracked`] and receives the set of signals the closure consulted, each
//! paired with the version observed at read time. Comparing recorded versions
//! against current ones ([`DepSet::is_stale`]) tells the caller whether a
//! re-evaluation is due. There is no push-side effect machinery; consumers
//! decide when to re-check.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A shared monotonic version counter.
///
/// Signals carry no value. A value owner bumps its signal on every write and
/// tracks it on every read; observers compare versions to detect change.
#[derive(Clone)]
pub struct Signal {
    core: Arc<SignalCore>,
}

struct SignalCore {
    version: AtomicU64,
}

thread_local! {
    static SCOPES: RefCell<Vec<Vec<(Signal, u64)>>> = const { RefCell::new(Vec::new()) };
    static BATCH: RefCell<BatchState> = const {
        RefCell::new(BatchState {
            depth: 0,
            deferred: Vec::new(),
        })
    };
}

struct BatchState {
    depth: usize,
    deferred: Vec<Signal>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            core: Arc::new(SignalCore {
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Current version of this signal.
    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::Acquire)
    }

    /// Advance the version, marking every recorded dependency on this signal
    /// stale. Inside a [`batch`], the advance is deferred to batch end and
    /// coalesced so N writes produce one version step.
    pub fn bump(&self) {
        let deferred = BATCH.with(|b| {
            let mut state = b.borrow_mut();
            if state.depth == 0 {
                return false;
            }
            if !state.deferred.iter().any(|s| s.same(self)) {
                state.deferred.push(self.clone());
            }
            true
        });
        if !deferred {
            self.core.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Record this signal (at its current version) in the innermost tracking
    /// scope. A no-op outside any scope.
    pub fn track(&self) {
        SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(top) = scopes.last_mut() {
                if !top.iter().any(|(s, _)| s.same(self)) {
                    let version = self.version();
                    top.push((self.clone(), version));
                }
            }
        });
    }

    /// Whether two handles refer to the same underlying signal.
    pub fn same(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("version", &self.version())
            .finish()
    }
}

/// Evaluate `f` under a fresh tracking scope and return its result together
/// with the dependencies it consulted.
///
/// Scopes nest: an inner `tracked` call records into its own scope only.
pub fn tracked<R>(f: impl FnOnce() -> R) -> (R, DepSet) {
    SCOPES.with(|scopes| scopes.borrow_mut().push(Vec::new()));
    let out = f();
    let entries = SCOPES.with(|scopes| scopes.borrow_mut().pop().unwrap_or_default());
    (out, DepSet { entries })
}

/// Run `f` with signal bumps deferred and coalesced until the outermost batch
/// exits. Values written inside the batch are visible immediately; only the
/// change notification (the version step) is grouped.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH.with(|b| b.borrow_mut().depth += 1);
    let out = f();
    let flush = BATCH.with(|b| {
        let mut state = b.borrow_mut();
        state.depth -= 1;
        if state.depth == 0 {
            std::mem::take(&mut state.deferred)
        } else {
            Vec::new()
        }
    });
    for signal in flush {
        signal.core.version.fetch_add(1, Ordering::AcqRel);
    }
    out
}

/// A set of `(signal, version-at-read)` pairs recorded by [`tracked`].
#[derive(Default)]
pub struct DepSet {
    entries: Vec<(Signal, u64)>,
}

impl DepSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any recorded signal has advanced past the version observed at
    /// read time.
    pub fn is_stale(&self) -> bool {
        self.entries
            .iter()
            .any(|(signal, seen)| signal.version() != *seen)
    }

    /// Fold `other` into `self`, keeping the first-seen version for signals
    /// already present.
    pub fn merge(&mut self, other: DepSet) {
        for (signal, version) in other.entries {
            if !self.entries.iter().any(|(s, _)| s.same(&signal)) {
                self.entries.push((signal, version));
            }
        }
    }
}

impl std::fmt::Debug for DepSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepSet").field("len", &self.len()).finish()
    }
}

/// An observable value cell: a value plus the signal announcing its changes.
pub struct Var<T> {
    value: Arc<RwLock<T>>,
    signal: Signal,
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            signal: self.signal.clone(),
        }
    }
}

impl<T: Clone> Var<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            signal: Signal::new(),
        }
    }

    /// Read the value, registering a dependency in the current tracking scope.
    pub fn get(&self) -> T {
        self.signal.track();
        self.peek()
    }

    /// Read the value without registering a dependency.
    pub fn peek(&self) -> T {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the value and bump the signal.
    pub fn set(&self, value: T) {
        match self.value.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
        self.signal.bump();
    }

    /// The signal announcing changes to this cell.
    pub fn signal(&self) -> Signal {
        self.signal.clone()
    }
}
