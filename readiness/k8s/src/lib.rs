//! Kubernetes plumbing for readiness tracking.
//!
//! Discovery lists each tracked kind and declares an expectation for every object it finds.
//! Watches observe objects as they are synced and cancel expectations for deleted objects.
//! Constraint templates additionally define the kinds of constraints that must be tracked.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod discover;
pub mod metrics;
pub mod templates;
mod watch;

pub use self::{
    discover::{expect_all, expect_objects},
    metrics::TrackerMetrics,
    watch::{observe_events, watch_all},
};
pub use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::watcher,
    Client, Resource, ResourceExt,
};
pub use policy_readiness_core::{ObjectKey, ObjectTracker, Tracker};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to list {kind}: {source}")]
    List {
        kind: String,
        #[source]
        source: kube::Error,
    },

    #[error("constraint template {name} has no spec")]
    MissingSpec { name: String },

    #[error("invalid constraint template {name}: {source}")]
    InvalidTemplate {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}
