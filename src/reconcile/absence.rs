use crate::client::{Client, Propagation};
use crate::error::ClientError;
use crate::resource::Resource;
use tracing::debug;

/// Delete `res`, treating "not found" as success
pub async fn absence<K, C>(client: &C, res: &K) -> Result<(), ClientError>
where
    K: Resource,
    C: Client<K> + ?Sized,
{
    tolerate_missing(res, client.delete(res).await)
}

/// [`absence`] with an explicit policy for the object's dependents
pub async fn absence_propagated<K, C>(
    client: &C,
    res: &K,
    propagation: Propagation,
) -> Result<(), ClientError>
where
    K: Resource,
    C: Client<K> + ?Sized,
{
    tolerate_missing(res, client.delete_propagated(res, propagation).await)
}

fn tolerate_missing<K: Resource>(
    res: &K,
    deleted: Result<(), ClientError>,
) -> Result<(), ClientError> {
    match deleted {
        Ok(()) => {
            debug!(resource.key = %res.key(), "Deleted resource");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
