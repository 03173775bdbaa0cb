//! Tracks the readiness of a single kind of resource.
//!
//! Expectations and observations may arrive in any order. Each key moves through an explicit
//! lifecycle:
//!
//! ```text
//!            expect               observe
//! Unknown ----------> Expected ------------> Resolved
//!    |  \                 |
//!    |   \  observe       | cancel_expect
//!    |    `-----> Observed ---expect---> Resolved
//!    |                    v
//!    `--cancel_expect--> Cancelled ---expect---> Resolved
//! ```
//!
//! Resolved keys are simply removed from the index, so a tracker only holds state for
//! outstanding keys. Once the tracker is populated and no expectations remain, it trips a circuit
//! breaker: every later operation is a no-op and all per-key state is released. Only the set of
//! kind names survives the breaker.

use crate::ObjectKey;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kube::{core::GroupVersionKind, Resource};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;


/// Reconciles expectations and observations for one resource kind.
///
/// All state is guarded by a single lock. Mutations take the write lock; `satisfied` only takes
/// the write lock when it trips the circuit breaker.
#[derive(Debug)]
pub struct ObjectTracker {
    gvk: GroupVersionKind,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    /// Set once the initial list of expectations is complete.
    populated: bool,

    /// Pending keys. Each key is in at most one pending state at a time.
    keys: HashMap<ObjectKey, Pending>,

    /// The number of `Pending::Expected` entries in `keys`.
    expected: usize,

    /// Every kind name passed to `expect`. Never cleared.
    kinds: HashSet<String>,

    /// The circuit breaker. Once set, it is never unset and `keys` stays empty.
    all_satisfied: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pending {
    /// Expected but not yet observed.
    Expected,

    /// Observed before it was expected.
    Observed,

    /// Cancelled before it was expected; the next expectation is dropped.
    Cancelled,
}

// === impl ObjectTracker ===

impl ObjectTracker {
    pub fn new(gvk: GroupVersionKind) -> Self {
        Self {
            gvk,
            state: RwLock::new(State::default()),
        }
    }

    /// The kind of resource this tracker gates.
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    /// Declares that a resource must be observed before the tracker is satisfied.
    ///
    /// Resources that are already being deleted are never expected.
    pub fn expect<K: Resource>(&self, obj: &K, dt: &K::DynamicType) {
        if obj.meta().deletion_timestamp.is_some() {
            tracing::trace!(
                key = %ObjectKey::from_resource(obj, dt),
                "Ignoring expectation for terminating resource"
            );
            return;
        }
        self.expect_key(ObjectKey::from_resource(obj, dt));
    }

    /// Declares that a resource has been observed.
    pub fn observe<K: Resource>(&self, obj: &K, dt: &K::DynamicType) {
        self.observe_key(ObjectKey::from_resource(obj, dt));
    }

    /// Withdraws an expectation, e.g. because the resource was deleted before it was observed.
    pub fn cancel_expect<K: Resource>(&self, obj: &K, dt: &K::DynamicType) {
        self.cancel_expect_key(ObjectKey::from_resource(obj, dt));
    }

    pub fn expect_key(&self, key: ObjectKey) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.all_satisfied {
            return;
        }

        if !state.kinds.contains(key.kind()) {
            state.kinds.insert(key.kind().to_string());
        }

        match state.keys.entry(key) {
            Entry::Occupied(entry) => match *entry.get() {
                Pending::Expected => {}
                Pending::Cancelled => {
                    tracing::trace!(key = %entry.key(), "Expectation was cancelled");
                    entry.remove();
                }
                Pending::Observed => {
                    tracing::trace!(key = %entry.key(), "Expectation already observed");
                    entry.remove();
                }
            },
            Entry::Vacant(entry) => {
                tracing::trace!(key = %entry.key(), "Expecting");
                entry.insert(Pending::Expected);
                state.expected += 1;
            }
        }
    }

    pub fn observe_key(&self, key: ObjectKey) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.all_satisfied {
            return;
        }

        match state.keys.entry(key) {
            Entry::Occupied(mut entry) => match *entry.get() {
                Pending::Expected => {
                    tracing::trace!(key = %entry.key(), "Observed");
                    entry.remove();
                    state.expected -= 1;
                }
                Pending::Observed => {}
                // An observation means the resource exists, so it supersedes an earlier
                // cancellation.
                Pending::Cancelled => {
                    entry.insert(Pending::Observed);
                }
            },
            Entry::Vacant(entry) => {
                tracing::trace!(key = %entry.key(), "Observed before expected");
                entry.insert(Pending::Observed);
            }
        }
    }

    pub fn cancel_expect_key(&self, key: ObjectKey) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.all_satisfied {
            return;
        }

        match state.keys.entry(key) {
            Entry::Occupied(entry) => match *entry.get() {
                Pending::Expected => {
                    tracing::trace!(key = %entry.key(), "Expectation cancelled");
                    entry.remove();
                    state.expected -= 1;
                }
                // Cancellation only withdraws expectations; an early observation is kept.
                Pending::Observed | Pending::Cancelled => {}
            },
            Entry::Vacant(entry) => {
                tracing::trace!(key = %entry.key(), "Cancelled before expected");
                entry.insert(Pending::Cancelled);
            }
        }
    }

    /// Marks the initial set of expectations as complete.
    pub fn expectations_done(&self) {
        let mut state = self.state.write();
        if !state.populated {
            tracing::debug!(kind = %self.gvk.kind, expected = state.expected, "Expectations populated");
            state.populated = true;
        }
    }

    pub fn populated(&self) -> bool {
        let state = self.state.read();
        state.all_satisfied || state.populated
    }

    /// Returns true when the tracker is populated and every expectation has been observed or
    /// cancelled.
    ///
    /// The first call that finds the tracker satisfied trips the circuit breaker, after which this
    /// always returns true.
    pub fn satisfied(&self) -> bool {
        {
            let state = self.state.read();
            if state.all_satisfied {
                return true;
            }
            if !state.populated || state.expected > 0 {
                return false;
            }
        }

        // Another caller may have changed the state (or tripped the breaker) between releasing
        // the read lock and acquiring the write lock, so the check is repeated.
        let mut state = self.state.write();
        if state.all_satisfied {
            return true;
        }
        if !state.populated || state.expected > 0 {
            return false;
        }

        tracing::info!(kind = %self.gvk.kind, "All expectations satisfied");
        state.all_satisfied = true;
        state.keys = HashMap::default();
        true
    }

    /// Returns the name of every kind that has been expected.
    ///
    /// This is unaffected by the circuit breaker.
    pub fn kinds(&self) -> HashSet<String> {
        self.state.read().kinds.clone()
    }

    /// Returns the keys that are still expected.
    pub fn outstanding(&self) -> Vec<ObjectKey> {
        self.state
            .read()
            .keys
            .iter()
            .filter(|(_, p)| **p == Pending::Expected)
            .map(|(k, _)| k.clone())
            .collect()
    }
}
