//! # Client Boundary
//!
//! Abstract interface to the remote API that owns the watched resources.
//!
//! The runtime depends only on these traits. `kubernetes` provides the Kubernetes
//! backed implementation; tests plug in an in-memory one.

use crate::error::ClientError;
use crate::resource::ResourceType;
use async_trait::async_trait;

pub mod kubernetes;

pub use kubernetes::{KubeClient, KubeWatcher};

/// CRUD and watch access to one resource kind
#[async_trait]
pub trait Client<K>: Send + Sync {
    async fn create(&self, res: &K) -> Result<(), ClientError>;

    /// Fetch by cache key; `ClientError::NotFound` when absent
    async fn get(&self, key: &str) -> Result<K, ClientError>;

    async fn update(&self, res: &K) -> Result<(), ClientError>;

    async fn delete(&self, res: &K) -> Result<(), ClientError>;

    /// Delete with an explicit policy for the object's dependents
    async fn delete_propagated(
        &self,
        res: &K,
        propagation: Propagation,
    ) -> Result<(), ClientError>;

    /// Open a change stream, optionally restricted to one namespace
    async fn watch(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Box<dyn Watcher<K>>, ClientError>;
}

/// What happens to the dependents of a deleted object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Dependents are left behind without an owner
    Orphan,
    /// The object goes away at once, dependents are collected afterwards
    Background,
    /// Dependents are deleted before the object
    Foreground,
}

/// A single open change stream
#[async_trait]
pub trait Watcher<K>: Send {
    /// Next change; `Ok(None)` is a clean end of stream
    async fn next(&mut self) -> Result<Option<WatchEvent<K>>, ClientError>;

    async fn close(&mut self) -> Result<(), ClientError>;
}

/// A change to one resource, carrying its full body
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> WatchEvent<K> {
    /// Event type label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }

    pub fn resource(&self) -> &K {
        match self {
            Self::Added(res) | Self::Modified(res) | Self::Deleted(res) => res,
        }
    }

    pub fn into_resource(self) -> K {
        match self {
            Self::Added(res) | Self::Modified(res) | Self::Deleted(res) => res,
        }
    }
}
