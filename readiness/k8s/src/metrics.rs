use policy_readiness_core::Tracker;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{family::Family, gauge::Gauge},
    registry::Registry,
};

/// Exposes the state of a [`Tracker`] for diagnostics.
#[derive(Clone, Debug)]
pub struct TrackerMetrics {
    satisfied: Family<KindLabels, Gauge>,
    outstanding: Family<KindLabels, Gauge>,
    kinds: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    group: String,
    kind: String,
}

impl TrackerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let satisfied = Family::default();
        prom.register(
            "satisfied",
            "Whether all expected resources of a kind have been observed",
            satisfied.clone(),
        );

        let outstanding = Family::default();
        prom.register(
            "outstanding",
            "Gauge of the number of expected resources of a kind not yet observed",
            outstanding.clone(),
        );

        let kinds = Gauge::default();
        prom.register(
            "kinds",
            "Gauge of the number of kinds that have been expected",
            kinds.clone(),
        );

        Self {
            satisfied,
            outstanding,
            kinds,
        }
    }

    /// Records the current state of each of the tracker's kinds.
    pub fn update(&self, tracker: &Tracker) {
        for ot in tracker.trackers() {
            let labels = KindLabels {
                group: ot.gvk().group.clone(),
                kind: ot.gvk().kind.clone(),
            };
            self.satisfied
                .get_or_create(&labels)
                .set(ot.satisfied() as i64);
            self.outstanding
                .get_or_create(&labels)
                .set(ot.outstanding().len() as i64);
        }
        self.kinds.set(tracker.kinds().len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;
    use policy_readiness_core::ObjectKey;

    fn encode(prom: &Registry) -> String {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, prom).expect("metrics must encode");
        buf
    }

    #[test]
    fn reports_tracker_state() {
        let mut prom = Registry::default();
        let metrics = TrackerMetrics::register(prom.sub_registry_with_prefix("readiness"));

        let tracker = Tracker::new([templates::gvk()]);
        let templates = tracker.for_kind(&templates::gvk());
        templates.expect_key(ObjectKey::new(templates::gvk(), "", "k8srequiredlabels"));
        templates.expectations_done();

        metrics.update(&tracker);
        let text = encode(&prom);
        assert!(text.contains(
            "readiness_satisfied{group=\"templates.gatekeeper.sh\",kind=\"ConstraintTemplate\"} 0"
        ), "{text}");
        assert!(text.contains(
            "readiness_outstanding{group=\"templates.gatekeeper.sh\",kind=\"ConstraintTemplate\"} 1"
        ), "{text}");
        assert!(text.contains("readiness_kinds 1"), "{text}");

        templates.observe_key(ObjectKey::new(templates::gvk(), "", "k8srequiredlabels"));
        metrics.update(&tracker);
        let text = encode(&prom);
        assert!(text.contains(
            "readiness_satisfied{group=\"templates.gatekeeper.sh\",kind=\"ConstraintTemplate\"} 1"
        ), "{text}");
        assert!(text.contains(
            "readiness_outstanding{group=\"templates.gatekeeper.sh\",kind=\"ConstraintTemplate\"} 0"
        ), "{text}");
        assert!(text.contains("readiness_kinds 1"), "{text}");
    }
}
