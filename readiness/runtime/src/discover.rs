use crate::{
    core::{ObjectTracker, Tracker},
    k8s::{self, templates, Api, DynamicObject, GroupVersionKind},
};
use std::sync::Arc;
use tokio::time;
use tracing::Instrument;

/// Lists constraint templates until the list succeeds.
///
/// Returns the templates that were listed.
pub(crate) async fn templates(
    api: &Api<DynamicObject>,
    tracker: &ObjectTracker,
    backoff: time::Duration,
) -> Vec<DynamicObject> {
    let ar = templates::api_resource();
    loop {
        match k8s::expect_all(api, &ar, tracker).await {
            Ok(templates) => {
                tracing::info!(templates = templates.len(), "Listed constraint templates");
                return templates;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to list constraint templates");
                time::sleep(backoff).await;
            }
        }
    }
}

/// Tracks the constraints of a single kind.
///
/// Constraints are listed until the list succeeds and watched until the kind is satisfied. Both
/// stop early if the kind stops being tracked because its template was deleted.
pub(crate) async fn constraints(
    client: k8s::Client,
    tracker: Arc<Tracker>,
    gvk: GroupVersionKind,
    backoff: time::Duration,
) {
    let ar = templates::constraint_resource(&gvk);
    let api = Api::<DynamicObject>::all_with(client, &ar);
    let constraints = tracker.for_kind(&gvk);
    let tracked = || {
        tracker
            .get(&gvk)
            .is_some_and(|ot| Arc::ptr_eq(&ot, &constraints))
    };

    // Observations may precede expectations, so the watch is started before the list.
    let watch = tokio::spawn(
        k8s::observe_events(k8s::watch_all(api.clone()), ar.clone(), constraints.clone())
            .in_current_span(),
    );

    while tracked() {
        match k8s::expect_all(&api, &ar, &constraints).await {
            Ok(listed) => {
                tracing::debug!(constraints = listed.len(), "Listed constraints");
                break;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to list constraints");
                time::sleep(backoff).await;
            }
        }
    }

    // Once the kind is satisfied, observations are no-ops.
    let mut interval = time::interval(backoff);
    while tracked() && !constraints.satisfied() {
        interval.tick().await;
    }
    tracing::debug!("Stopped watching constraints");
    watch.abort();
}
