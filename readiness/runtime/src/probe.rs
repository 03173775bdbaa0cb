use crate::{core::Tracker, k8s::TrackerMetrics};
use std::sync::Arc;
use tokio::time;

/// The maximum number of outstanding keys logged per kind.
const MAX_LOGGED_KEYS: usize = 10;

/// Periodically checks the tracker, publishing its readiness until it is satisfied.
///
/// The tracker never becomes unsatisfied once it is satisfied, so the task completes then.
pub(crate) async fn run(
    tracker: Arc<Tracker>,
    metrics: TrackerMetrics,
    period: time::Duration,
    mut set_ready: impl FnMut(bool),
) {
    set_ready(false);
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;

        let ready = tracker.satisfied();
        metrics.update(&tracker);
        set_ready(ready);
        if ready {
            tracing::info!("Policy resources are ready");
            return;
        }

        for gvk in tracker.unsatisfied() {
            let Some(ot) = tracker.get(&gvk) else {
                continue;
            };
            let outstanding = ot.outstanding();
            tracing::debug!(
                group = %gvk.group,
                kind = %gvk.kind,
                populated = ot.populated(),
                outstanding = outstanding.len(),
                "Waiting for resources"
            );
            for key in outstanding.iter().take(MAX_LOGGED_KEYS) {
                tracing::trace!(%key, "Outstanding");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::ObjectKey, k8s::templates};
    use prometheus_client::registry::Registry;
    use tokio::sync::watch;

    #[tokio::test(start_paused = true)]
    async fn ready_once_satisfied() {
        let tracker = Arc::new(Tracker::new([templates::gvk()]));
        let metrics = TrackerMetrics::register(&mut Registry::default());
        let (tx, rx) = watch::channel(true);
        let task = tokio::spawn(run(
            tracker.clone(),
            metrics,
            time::Duration::from_secs(1),
            move |ready| {
                let _ = tx.send(ready);
            },
        ));

        let templates = tracker.for_kind(&templates::gvk());
        let key = ObjectKey::new(templates::gvk(), "", "k8srequiredlabels");
        templates.expect_key(key.clone());
        templates.expectations_done();

        time::sleep(time::Duration::from_secs(3)).await;
        assert!(!*rx.borrow(), "must not be ready while a template is outstanding");
        assert!(!task.is_finished());

        templates.observe_key(key);
        task.await.expect("probe must not fail");
        assert!(*rx.borrow());
    }
}
