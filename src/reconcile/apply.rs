use crate::client::Client;
use crate::error::ClientError;
use crate::resource::Resource;
use tracing::debug;

/// Create `desired`, or update the existing object with it
///
/// When the object already exists, `merge(existing, desired)` produces the
/// object to write back. It receives the live object, so server-populated
/// fields such as `resourceVersion` survive; the typical merge copies labels,
/// annotations and spec from `desired` (see [`merge_metadata`]).
pub async fn apply<K, C, F>(client: &C, desired: &K, merge: F) -> Result<(), ClientError>
where
    K: Resource,
    C: Client<K> + ?Sized,
    F: FnOnce(K, &K) -> K,
{
    let key = desired.key();
    match client.get(&key).await {
        Ok(existing) => {
            let updated = merge(existing, desired);
            client.update(&updated).await?;
            debug!(resource.key = %key, "Updated resource");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            client.create(desired).await?;
            debug!(resource.key = %key, "Created resource");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Copy labels and annotations of `desired` onto `existing`
///
/// Meant to be called from an [`apply`] merge closure before copying the
/// kind-specific spec.
pub fn merge_metadata<K: kube::Resource>(existing: &mut K, desired: &K) {
    let desired_meta = desired.meta();
    let meta = existing.meta_mut();
    meta.labels.clone_from(&desired_meta.labels);
    meta.annotations.clone_from(&desired_meta.annotations);
}
