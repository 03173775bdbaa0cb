use futures::prelude::*;
use kube::{
    api::Api,
    runtime::{watcher, WatchStreamExt},
    Resource, ResourceExt,
};
use policy_readiness_core::ObjectTracker;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};

/// Watches all objects of a kind, retrying with backoff when the watch fails.
pub fn watch_all<K>(api: Api<K>) -> impl Stream<Item = watcher::Event<K>> + Send
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(error) => {
                    tracing::warn!(%error, "Watch failed");
                    None
                }
            }
        })
}

/// Observes objects as they are applied and cancels the expectations of deleted objects.
pub async fn observe_events<K>(
    events: impl Stream<Item = watcher::Event<K>>,
    dt: K::DynamicType,
    tracker: Arc<ObjectTracker>,
) where
    K: Resource,
{
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        match event {
            watcher::Event::Init => tracing::debug!(kind = %K::kind(&dt), "Watch initializing"),
            watcher::Event::InitDone => tracing::debug!(kind = %K::kind(&dt), "Watch initialized"),
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                tracing::trace!(name = %obj.name_any(), namespace = ?obj.namespace(), "Observed");
                tracker.observe(&obj, &dt);
            }
            watcher::Event::Delete(obj) => {
                tracing::trace!(name = %obj.name_any(), namespace = ?obj.namespace(), "Deleted");
                tracker.cancel_expect(&obj, &dt);
            }
        }
    }
}
