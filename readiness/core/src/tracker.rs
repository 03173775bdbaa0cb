use crate::ObjectTracker;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kube::core::GroupVersionKind;
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Aggregates readiness across one [`ObjectTracker`] per resource kind.
#[derive(Debug, Default)]
pub struct Tracker {
    kinds: RwLock<Kinds>,

    /// Latched once every tracker has been satisfied.
    satisfied: AtomicBool,
}

#[derive(Debug, Default)]
struct Kinds {
    trackers: HashMap<GroupVersionKind, Arc<ObjectTracker>>,

    /// Kinds that have been cancelled. They are never tracked again.
    cancelled: HashSet<GroupVersionKind>,

    /// Kind names expected by the trackers of cancelled kinds.
    retired: HashSet<String>,
}

// === impl Tracker ===

impl Tracker {
    /// Creates a tracker that gates readiness on each of the `required` kinds.
    pub fn new(required: impl IntoIterator<Item = GroupVersionKind>) -> Self {
        let trackers = required
            .into_iter()
            .map(|gvk| (gvk.clone(), Arc::new(ObjectTracker::new(gvk))))
            .collect();
        Self {
            kinds: RwLock::new(Kinds {
                trackers,
                ..Kinds::default()
            }),
            satisfied: AtomicBool::new(false),
        }
    }

    pub fn shared(required: impl IntoIterator<Item = GroupVersionKind>) -> Arc<Self> {
        Arc::new(Self::new(required))
    }

    /// Returns the tracker for a kind, creating it if necessary.
    ///
    /// A newly created tracker gates readiness until it is satisfied, unless the aggregate has
    /// already been satisfied. A kind that has been cancelled gets a detached tracker that never
    /// gates readiness.
    pub fn for_kind(&self, gvk: &GroupVersionKind) -> Arc<ObjectTracker> {
        if let Some(ot) = self.kinds.read().trackers.get(gvk) {
            return ot.clone();
        }

        let mut kinds = self.kinds.write();
        if kinds.cancelled.contains(gvk) {
            tracing::debug!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "Kind was cancelled");
            return Arc::new(ObjectTracker::new(gvk.clone()));
        }
        kinds
            .trackers
            .entry(gvk.clone())
            .or_insert_with(|| {
                tracing::debug!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "Tracking kind");
                Arc::new(ObjectTracker::new(gvk.clone()))
            })
            .clone()
    }

    /// Returns the tracker for a kind if it gates readiness.
    pub fn get(&self, gvk: &GroupVersionKind) -> Option<Arc<ObjectTracker>> {
        self.kinds.read().trackers.get(gvk).cloned()
    }

    /// Stops gating readiness on a kind, e.g. because the template that defines it was deleted.
    ///
    /// The kind is never tracked again, even if it had not been tracked yet.
    pub fn cancel_kind(&self, gvk: &GroupVersionKind) {
        let mut kinds = self.kinds.write();
        kinds.cancelled.insert(gvk.clone());
        if let Some(ot) = kinds.trackers.remove(gvk) {
            kinds.retired.extend(ot.kinds());
            tracing::debug!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "Stopped tracking kind");
        }
    }

    /// Returns true once every kind's tracker is satisfied.
    ///
    /// The result latches: after the first `true`, no trackers are consulted again.
    pub fn satisfied(&self) -> bool {
        if self.satisfied.load(Ordering::Acquire) {
            return true;
        }

        let kinds = self.kinds.read();
        if !kinds.trackers.values().all(|ot| ot.satisfied()) {
            return false;
        }

        if !self.satisfied.swap(true, Ordering::AcqRel) {
            tracing::info!(kinds = kinds.trackers.len(), "All kinds satisfied");
        }
        true
    }

    /// Returns the kinds that still gate readiness.
    pub fn unsatisfied(&self) -> Vec<GroupVersionKind> {
        if self.satisfied.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.kinds
            .read()
            .trackers
            .iter()
            .filter(|(_, ot)| !ot.satisfied())
            .map(|(gvk, _)| gvk.clone())
            .collect()
    }

    /// Returns every kind name expected by any tracker, including those of cancelled kinds.
    pub fn kinds(&self) -> HashSet<String> {
        let kinds = self.kinds.read();
        let mut names = kinds.retired.clone();
        for ot in kinds.trackers.values() {
            names.extend(ot.kinds());
        }
        names
    }

    /// Returns a snapshot of the per-kind trackers.
    pub fn trackers(&self) -> Vec<Arc<ObjectTracker>> {
        self.kinds.read().trackers.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectKey;

    fn templates() -> GroupVersionKind {
        GroupVersionKind::gvk("templates.gatekeeper.sh", "v1beta1", "ConstraintTemplate")
    }

    fn constraints(kind: &str) -> GroupVersionKind {
        GroupVersionKind::gvk("constraints.gatekeeper.sh", "v1beta1", kind)
    }

    #[test]
    fn empty_is_satisfied() {
        let tracker = Tracker::default();
        assert!(tracker.satisfied());
    }

    #[test]
    fn requires_every_kind() {
        let tracker = Tracker::new([templates()]);
        assert!(!tracker.satisfied());
        assert_eq!(tracker.unsatisfied(), vec![templates()]);

        let ct = tracker.for_kind(&templates());
        ct.expect_key(ObjectKey::new(templates(), "", "k8srequiredlabels"));
        ct.expectations_done();

        let labels = tracker.for_kind(&constraints("K8sRequiredLabels"));
        labels.expect_key(ObjectKey::new(
            constraints("K8sRequiredLabels"),
            "",
            "must-have-owner",
        ));
        labels.expectations_done();

        ct.observe_key(ObjectKey::new(templates(), "", "k8srequiredlabels"));
        assert!(ct.satisfied());
        assert!(!tracker.satisfied(), "constraints remain");
        assert_eq!(
            tracker.unsatisfied(),
            vec![constraints("K8sRequiredLabels")]
        );

        labels.observe_key(ObjectKey::new(
            constraints("K8sRequiredLabels"),
            "",
            "must-have-owner",
        ));
        assert!(tracker.satisfied());
        assert!(tracker.unsatisfied().is_empty());
    }

    #[test]
    fn for_kind_is_shared() {
        let tracker = Tracker::new([templates()]);
        let a = tracker.for_kind(&templates());
        let b = tracker.for_kind(&templates());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(tracker.get(&constraints("Missing")).is_none());
        assert_eq!(tracker.trackers().len(), 1);
    }

    #[test]
    fn cancelled_kinds_do_not_gate() {
        let tracker = Tracker::new([templates()]);
        tracker.for_kind(&templates()).expectations_done();
        tracker.for_kind(&constraints("K8sAllowedRepos"));
        assert!(!tracker.satisfied());

        tracker.cancel_kind(&constraints("K8sAllowedRepos"));
        assert!(tracker.get(&constraints("K8sAllowedRepos")).is_none());
        assert!(tracker.satisfied());
    }

    #[test]
    fn satisfied_latches() {
        let tracker = Tracker::new([templates()]);
        tracker.for_kind(&templates()).expectations_done();
        assert!(tracker.satisfied());

        // Kinds registered after the aggregate is satisfied never gate readiness.
        tracker.for_kind(&constraints("K8sRequiredLabels"));
        assert!(tracker.satisfied());
        assert!(tracker.unsatisfied().is_empty());
    }

    #[test]
    fn kinds_union() {
        let tracker = Tracker::new([templates(), constraints("K8sRequiredLabels")]);
        tracker
            .for_kind(&templates())
            .expect_key(ObjectKey::new(templates(), "", "a"));
        tracker
            .for_kind(&constraints("K8sRequiredLabels"))
            .expect_key(ObjectKey::new(constraints("K8sRequiredLabels"), "", "b"));

        let kinds = tracker.kinds();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains("ConstraintTemplate"));
        assert!(kinds.contains("K8sRequiredLabels"));
    }

    #[test]
    fn cancel_before_register() {
        let tracker = Tracker::new([templates()]);
        tracker.for_kind(&templates()).expectations_done();

        // The template is deleted before its constraint kind is registered.
        tracker.cancel_kind(&constraints("K8sGone"));
        let gone = tracker.for_kind(&constraints("K8sGone"));
        gone.expect_key(ObjectKey::new(constraints("K8sGone"), "", "orphan"));

        assert!(tracker.get(&constraints("K8sGone")).is_none());
        assert!(!Arc::ptr_eq(&gone, &tracker.for_kind(&constraints("K8sGone"))));
        assert!(tracker.unsatisfied().is_empty());
        assert!(tracker.satisfied());
    }

    #[test]
    fn kinds_survive_cancellation() {
        let tracker = Tracker::new([templates()]);
        let repos = tracker.for_kind(&constraints("K8sAllowedRepos"));
        repos.expect_key(ObjectKey::new(constraints("K8sAllowedRepos"), "", "a"));

        tracker.cancel_kind(&constraints("K8sAllowedRepos"));
        assert!(tracker.kinds().contains("K8sAllowedRepos"));
    }
}
