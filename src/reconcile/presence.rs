use crate::client::Client;
use crate::error::ClientError;
use crate::resource::Resource;
use tracing::debug;

/// Create `res`, treating "already exists" as success
///
/// The existing object is left untouched; use [`apply`](super::apply) when its
/// content must match as well.
pub async fn presence<K, C>(client: &C, res: &K) -> Result<(), ClientError>
where
    K: Resource,
    C: Client<K> + ?Sized,
{
    match client.create(res).await {
        Ok(()) => {
            debug!(resource.key = %res.key(), "Created resource");
            Ok(())
        }
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(e),
    }
}
