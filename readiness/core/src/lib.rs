//! Readiness tracking for policy resources.
//!
//! A policy controller must not start enforcing policy until every policy resource it is
//! responsible for has been discovered from the cluster and loaded. Discovery lists each kind of
//! resource and declares an expectation for every object it finds; watches observe objects as they
//! are loaded. The two streams are unordered and may carry duplicates, so each kind is tracked by
//! an [`ObjectTracker`] that reconciles them:
//!
//! ```text
//! [ list ] --expect--> [ ObjectTracker ] <--observe/cancel-- [ watch ]
//!                             |
//!                         satisfied
//!                             v
//!                        [ Tracker ] --> readiness probe
//! ```
//!
//! Once a tracker is satisfied it trips a circuit breaker and releases all per-object state.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod key;
mod object_tracker;
mod tracker;

pub use self::{key::ObjectKey, object_tracker::ObjectTracker, tracker::Tracker};
pub use kube::core::GroupVersionKind;
