//! # Resource
//!
//! Identity of the objects an operator watches.
//!
//! The runtime never looks inside a resource body. It only needs the cache key
//! (`namespace/name`), the generation used for update deduplication and the UID.
//! Every `kube::Resource` gets these for free through a blanket implementation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

/// A watched object as seen by the runtime
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    /// Object metadata carrying name, namespace, generation and UID
    fn object_meta(&self) -> &ObjectMeta;

    /// Cache key: `namespace/name`, or `name` for cluster-scoped objects
    fn key(&self) -> String {
        let meta = self.object_meta();
        object_key(meta.namespace.as_deref(), meta.name.as_deref().unwrap_or_default())
    }

    /// Spec generation, `0` when the server has not assigned one
    fn generation(&self) -> i64 {
        self.object_meta().generation.unwrap_or(0)
    }

    fn object_uid(&self) -> Option<&str> {
        self.object_meta().uid.as_deref()
    }
}

impl<K> Resource for K
where
    K: kube::Resource + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn object_meta(&self) -> &ObjectMeta {
        kube::Resource::meta(self)
    }
}

/// Build a cache key from namespace and name
pub fn object_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Split a cache key back into namespace and name
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, key),
    }
}

/// Describes the kind of resource an operator watches
///
/// Resolved once when the operator is built. The concrete Rust type of the
/// resource plays the role of the factory for new instances, so nothing is
/// constructed by reflection at event time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in API paths (e.g. `deployments`)
    pub plural: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    /// Descriptor of a statically typed kube resource
    pub fn of<K>() -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.plural, self.version)
        } else {
            write!(f, "{}.{}/{}", self.plural, self.group, self.version)
        }
    }
}
