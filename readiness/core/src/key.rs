use kube::{core::GroupVersionKind, Resource, ResourceExt};
use std::fmt;

/// Uniquely identifies a tracked resource by its kind and namespaced name.
///
/// Cluster-scoped resources have an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    gvk: GroupVersionKind,
    namespace: String,
    name: String,
}

// === impl ObjectKey ===

impl ObjectKey {
    pub fn new(gvk: GroupVersionKind, namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            gvk,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Builds the key for a Kubernetes resource.
    ///
    /// Statically typed resources pass `&()`; dynamic objects pass the `ApiResource` they were
    /// fetched with.
    pub fn from_resource<K: Resource>(obj: &K, dt: &K::DynamicType) -> Self {
        let gvk = GroupVersionKind {
            group: K::group(dt).into_owned(),
            version: K::version(dt).into_owned(),
            kind: K::kind(dt).into_owned(),
        };
        Self {
            gvk,
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    pub fn kind(&self) -> &str {
        &self.gvk.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let GroupVersionKind {
            group,
            version,
            kind,
        } = &self.gvk;
        write!(
            f,
            "{}/{} [{}/{}, Kind={}]",
            self.namespace, self.name, group, version, kind
        )
    }
}
