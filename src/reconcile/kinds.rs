//! Ready-made [`apply`] merges for common built-in kinds
//!
//! [`job_absence`] is the matching delete for jobs.
//!
//! Each helper creates the object when it is missing and otherwise copies only
//! the fields the API server lets a controller own: immutable or
//! server-assigned fields of the live object are preserved.

use super::absence::absence_propagated;
use super::apply::{apply, merge_metadata};
use crate::client::{Client, Propagation};
use crate::error::ClientError;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};

/// Copies labels, annotations and spec
pub async fn deployment<C>(client: &C, desired: &Deployment) -> Result<(), ClientError>
where
    C: Client<Deployment> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        merge_metadata(&mut existing, desired);
        existing.spec.clone_from(&desired.spec);
        existing
    })
    .await
}

/// Copies labels, annotations and spec
pub async fn daemon_set<C>(client: &C, desired: &DaemonSet) -> Result<(), ClientError>
where
    C: Client<DaemonSet> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        merge_metadata(&mut existing, desired);
        existing.spec.clone_from(&desired.spec);
        existing
    })
    .await
}

/// Copies the spec but keeps the cluster IP the server allocated
pub async fn service<C>(client: &C, desired: &Service) -> Result<(), ClientError>
where
    C: Client<Service> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        let cluster_ip = existing.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        existing.spec.clone_from(&desired.spec);
        if let Some(spec) = existing.spec.as_mut() {
            if cluster_ip.is_some() {
                spec.cluster_ip = cluster_ip;
            }
        }
        existing
    })
    .await
}

/// Copies data and binary data
pub async fn config_map<C>(client: &C, desired: &ConfigMap) -> Result<(), ClientError>
where
    C: Client<ConfigMap> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        existing.data.clone_from(&desired.data);
        existing.binary_data.clone_from(&desired.binary_data);
        existing
    })
    .await
}

/// Copies labels and annotations only; a job's spec is immutable
pub async fn job<C>(client: &C, desired: &Job) -> Result<(), ClientError>
where
    C: Client<Job> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        merge_metadata(&mut existing, desired);
        existing
    })
    .await
}

/// Deletes a job together with its pods
///
/// Without an explicit policy the API server orphans the pods of a job.
pub async fn job_absence<C>(client: &C, job: &Job) -> Result<(), ClientError>
where
    C: Client<Job> + ?Sized,
{
    absence_propagated(client, job, Propagation::Background).await
}

/// Copies labels, annotations and requested resources, the only mutable part
/// of a claim's spec
pub async fn persistent_volume_claim<C>(
    client: &C,
    desired: &PersistentVolumeClaim,
) -> Result<(), ClientError>
where
    C: Client<PersistentVolumeClaim> + ?Sized,
{
    apply(client, desired, |mut existing, desired| {
        merge_metadata(&mut existing, desired);
        let resources = desired.spec.as_ref().and_then(|s| s.resources.clone());
        existing.spec.get_or_insert_with(Default::default).resources = resources;
        existing
    })
    .await
}
