use async_trait::async_trait;

use crate::{Association, AssociationAttributes, GatewayError, NaturalKey, ParentId, RemoteId};

/// Remote API holding the current associations of a parent resource.
///
/// Implementations map their failures onto [`crate::GatewayErrorKind`]:
/// a missing parent or target is `NotFound`, a uniqueness collision is
/// `Conflict`, anything else is `Transport`.
#[async_trait]
pub trait Gateway<K, A>: Send + Sync
where
    K: NaturalKey,
    A: AssociationAttributes,
{
    /// Lists every association currently held by `parent`.
    /// Each returned association must carry its remote id.
    async fn list(&self, parent: &ParentId) -> Result<Vec<Association<K, A>>, GatewayError>;

    async fn create(
        &self,
        parent: &ParentId,
        association: &Association<K, A>,
    ) -> Result<RemoteId, GatewayError>;

    async fn update(
        &self,
        parent: &ParentId,
        remote_id: &RemoteId,
        association: &Association<K, A>,
    ) -> Result<(), GatewayError>;

    async fn remove(&self, parent: &ParentId, remote_id: &RemoteId) -> Result<(), GatewayError>;
}
