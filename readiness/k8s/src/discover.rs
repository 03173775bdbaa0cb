use crate::Error;
use kube::{
    api::{Api, ListParams},
    Resource,
};
use policy_readiness_core::ObjectTracker;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, future::Future};

/// The number of objects requested per list call.
const PAGE_SIZE: u32 = 500;

/// Lists every object of a kind and expects each of them, marking the tracker's expectations as
/// done once the list completes.
///
/// No expectations are recorded unless every page is listed. A failed list may be retried, but the
/// watch may have observed objects from earlier pages in the meantime; expecting those again would
/// leave them outstanding forever.
///
/// The listed objects are returned so that callers may derive further expectations from them.
pub async fn expect_all<K>(
    api: &Api<K>,
    dt: &K::DynamicType,
    tracker: &ObjectTracker,
) -> Result<Vec<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let objects = expect_pages(tracker, dt, |token| {
        let mut params = ListParams::default().limit(PAGE_SIZE);
        if let Some(token) = token {
            params = params.continue_token(&token);
        }
        async move {
            let list = api.list(&params).await.map_err(|source| Error::List {
                kind: K::kind(dt).into_owned(),
                source,
            })?;
            Ok::<_, Error>((list.items, list.metadata.continue_))
        }
    })
    .await?;

    tracing::debug!(kind = %K::kind(dt), objects = objects.len(), "Listed");
    Ok(objects)
}

/// Fetches pages until no continue token is returned, then expects every object.
async fn expect_pages<K, E, F, Fut>(
    tracker: &ObjectTracker,
    dt: &K::DynamicType,
    mut fetch: F,
) -> Result<Vec<K>, E>
where
    K: Resource,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<K>, Option<String>), E>>,
{
    let mut objects = Vec::new();
    let mut token = None;
    loop {
        let (items, next) = fetch(token.take()).await?;
        objects.extend(items);
        match next {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    expect_objects(tracker, &objects, dt);
    tracker.expectations_done();
    Ok(objects)
}

/// Expects each of the given objects.
pub fn expect_objects<K: Resource>(tracker: &ObjectTracker, objects: &[K], dt: &K::DynamicType) {
    for obj in objects {
        tracker.expect(obj, dt);
    }
}
