//! Constraint templates and the constraint kinds they define.
//!
//! Each `ConstraintTemplate` declares a CRD for a kind of constraint. Templates are tracked like
//! any other resource; in addition, the constraints of every template that exists at startup must
//! be tracked before the controller is ready.

use crate::Error;
use futures::prelude::*;
use kube::{
    core::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::watcher,
    ResourceExt,
};
use policy_readiness_core::Tracker;
use serde::Deserialize;
use std::sync::Arc;

pub const TEMPLATES_GROUP: &str = "templates.gatekeeper.sh";
pub const CONSTRAINTS_GROUP: &str = "constraints.gatekeeper.sh";
const VERSION: &str = "v1beta1";
const KIND: &str = "ConstraintTemplate";

/// The parts of a template's spec needed to identify its constraints.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintTemplateSpec {
    pub crd: Crd,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Crd {
    pub spec: CrdSpec,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CrdSpec {
    pub names: Names,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Names {
    pub kind: String,

    #[serde(default)]
    pub short_names: Vec<String>,
}

pub fn gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(TEMPLATES_GROUP, VERSION, KIND)
}

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&gvk())
}

pub fn spec(template: &DynamicObject) -> Result<ConstraintTemplateSpec, Error> {
    let spec = template.data.get("spec").ok_or_else(|| Error::MissingSpec {
        name: template.name_any(),
    })?;
    serde_json::from_value(spec.clone()).map_err(|source| Error::InvalidTemplate {
        name: template.name_any(),
        source,
    })
}

/// Returns the kind of constraint defined by a template.
pub fn constraint_gvk(template: &DynamicObject) -> Result<GroupVersionKind, Error> {
    let spec = spec(template)?;
    Ok(GroupVersionKind::gvk(
        CONSTRAINTS_GROUP,
        VERSION,
        &spec.crd.spec.names.kind,
    ))
}

/// Constraint CRDs are named by the lowercased kind, without pluralization.
pub fn constraint_resource(gvk: &GroupVersionKind) -> ApiResource {
    ApiResource::from_gvk_with_plural(gvk, &gvk.kind.to_ascii_lowercase())
}

/// Observes template events.
///
/// When a template is deleted, its constraints no longer gate readiness.
pub async fn observe_template_events(
    events: impl Stream<Item = watcher::Event<DynamicObject>>,
    tracker: Arc<Tracker>,
) {
    let ar = api_resource();
    let templates = tracker.for_kind(&gvk());
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        match event {
            watcher::Event::Init => tracing::debug!("Template watch initializing"),
            watcher::Event::InitDone => tracing::debug!("Template watch initialized"),
            watcher::Event::Apply(template) | watcher::Event::InitApply(template) => {
                tracing::trace!(name = %template.name_any(), "Observed template");
                templates.observe(&template, &ar);
            }
            watcher::Event::Delete(template) => {
                tracing::debug!(name = %template.name_any(), "Template deleted");
                templates.cancel_expect(&template, &ar);
                match constraint_gvk(&template) {
                    Ok(gvk) => tracker.cancel_kind(&gvk),
                    Err(error) => tracing::warn!(%error, "Failed to resolve constraint kind"),
                }
            }
        }
    }
}
