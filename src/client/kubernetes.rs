//! # Kubernetes Client
//!
//! `Client` and `Watcher` implementations backed by `kube::Api`.
//!
//! Only namespaced kinds are supported. Requests for an object whose key has no
//! namespace go to the client's configured namespace, falling back to the
//! namespace of the kubeconfig context.

use crate::client::{Client, Propagation, WatchEvent, Watcher};
use crate::constants::{FIELD_MANAGER, WATCH_RESOURCE_VERSION};
use crate::error::ClientError;
use crate::resource::{split_key, ResourceType};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{
    Api, DeleteParams, Patch, PatchParams, PostParams, PropagationPolicy,
    WatchEvent as KubeWatchEvent, WatchParams,
};
use kube::core::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Client for one namespaced resource kind
pub struct KubeClient<K> {
    client: kube::Client,
    namespace: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> fmt::Debug for KubeClient<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<K> Clone for KubeClient<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> KubeClient<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug
        + Send
        + Sync
        + 'static,
{
    /// Client whose unqualified keys resolve in the kubeconfig default namespace
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            namespace: None,
            _kind: PhantomData,
        }
    }

    /// Client whose unqualified keys resolve in `namespace`
    pub fn namespaced(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: Some(namespace.into()),
            _kind: PhantomData,
        }
    }

    /// Underlying kube client, for building clients of other kinds
    pub fn kube_client(&self) -> &kube::Client {
        &self.client
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace
            .filter(|ns| !ns.is_empty())
            .or(self.namespace.as_deref().filter(|ns| !ns.is_empty()))
        {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    fn api_for(&self, res: &K) -> Api<K> {
        self.api(res.meta().namespace.as_deref())
    }

    async fn delete_with(&self, res: &K, params: &DeleteParams) -> Result<(), ClientError> {
        let name = object_name(res)?;
        self.api_for(res).delete(name, params).await?;
        Ok(())
    }

    /// Replace the status subresource of `res` with its current `status` field
    pub async fn update_status(&self, res: &K) -> Result<(), ClientError> {
        let name = object_name(res)?;
        let mut object = serde_json::to_value(res)?;
        let status = object
            .get_mut("status")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api_for(res).patch_status(name, &params, &patch).await?;
        Ok(())
    }
}

fn delete_params(propagation: Propagation) -> DeleteParams {
    let policy = match propagation {
        Propagation::Orphan => PropagationPolicy::Orphan,
        Propagation::Background => PropagationPolicy::Background,
        Propagation::Foreground => PropagationPolicy::Foreground,
    };
    DeleteParams {
        propagation_policy: Some(policy),
        ..Default::default()
    }
}

/// Fail when a watch asks for a different kind than `K`
fn check_resource_type<K>(requested: &ResourceType) -> Result<(), ClientError>
where
    K: kube::Resource<DynamicType = ()>,
{
    let served = ResourceType::of::<K>();
    if *requested == served {
        Ok(())
    } else {
        Err(ClientError::ResourceTypeMismatch {
            requested: requested.to_string(),
            served: served.to_string(),
        })
    }
}

fn object_name<K: kube::Resource>(res: &K) -> Result<&str, ClientError> {
    res.meta()
        .name
        .as_deref()
        .ok_or_else(|| ClientError::Other(anyhow::anyhow!("resource has no name")))
}

#[async_trait]
impl<K> Client<K> for KubeClient<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug
        + Send
        + Sync
        + 'static,
{
    async fn create(&self, res: &K) -> Result<(), ClientError> {
        self.api_for(res)
            .create(&PostParams::default(), res)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<K, ClientError> {
        let (namespace, name) = split_key(key);
        self.api(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    async fn update(&self, res: &K) -> Result<(), ClientError> {
        let name = object_name(res)?;
        self.api_for(res)
            .replace(name, &PostParams::default(), res)
            .await?;
        Ok(())
    }

    async fn delete(&self, res: &K) -> Result<(), ClientError> {
        self.delete_with(res, &DeleteParams::default()).await
    }

    async fn delete_propagated(
        &self,
        res: &K,
        propagation: Propagation,
    ) -> Result<(), ClientError> {
        self.delete_with(res, &delete_params(propagation)).await
    }

    async fn watch(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Box<dyn Watcher<K>>, ClientError> {
        check_resource_type::<K>(resource_type)?;

        let api: Api<K> = match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        debug!(
            resource = %resource_type,
            namespace = namespace.unwrap_or("*"),
            "Opening watch stream"
        );
        let stream = api
            .watch(&WatchParams::default(), WATCH_RESOURCE_VERSION)
            .await?
            .boxed();
        Ok(Box::new(KubeWatcher { stream }))
    }
}

/// Watch stream returned by [`KubeClient`]
pub struct KubeWatcher<K> {
    stream: BoxStream<'static, kube::Result<KubeWatchEvent<K>>>,
}

impl<K> fmt::Debug for KubeWatcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeWatcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K> Watcher<K> for KubeWatcher<K>
where
    K: Send + 'static,
{
    async fn next(&mut self) -> Result<Option<WatchEvent<K>>, ClientError> {
        loop {
            let event = match self.stream.next().await {
                None => return Ok(None),
                Some(event) => event?,
            };
            match event {
                KubeWatchEvent::Added(res) => return Ok(Some(WatchEvent::Added(res))),
                KubeWatchEvent::Modified(res) => return Ok(Some(WatchEvent::Modified(res))),
                KubeWatchEvent::Deleted(res) => return Ok(Some(WatchEvent::Deleted(res))),
                KubeWatchEvent::Bookmark(_) => continue,
                KubeWatchEvent::Error(err) => return Err(ClientError::Stream(format!("{err:?}"))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.stream = futures::stream::empty().boxed();
        Ok(())
    }
}
