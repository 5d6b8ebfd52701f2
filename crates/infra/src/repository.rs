//! Entity storage port.

use std::sync::Arc;

use async_trait::async_trait;

use hrgate_auth::{Permission, Role, User};
use hrgate_core::Entity;

use crate::{InMemoryAccessStore, LinkStore, PostgresAccessStore, StoreError};

/// CRUD boundary for one entity type.
///
/// Implementations are unscoped: they see every row. Request paths reach
/// tenant-owned types through [`crate::TenantFiltered`], never directly.
#[async_trait]
pub trait Repository<E: Entity + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, id: &E::Id) -> Result<Option<E>, StoreError>;

    async fn list(&self) -> Result<Vec<E>, StoreError>;

    /// Persist a draft. The store generates the id.
    async fn insert(&self, draft: E::Draft) -> Result<E, StoreError>;

    async fn update(&self, entity: E) -> Result<E, StoreError>;

    /// Remove a row, returning its last state.
    async fn delete(&self, id: &E::Id) -> Result<E, StoreError>;
}

#[async_trait]
impl<E, S> Repository<E> for Arc<S>
where
    E: Entity + Send + Sync + 'static,
    S: Repository<E> + ?Sized,
{
    async fn get(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<E>, StoreError> {
        (**self).list().await
    }

    async fn insert(&self, draft: E::Draft) -> Result<E, StoreError> {
        (**self).insert(draft).await
    }

    async fn update(&self, entity: E) -> Result<E, StoreError> {
        (**self).update(entity).await
    }

    async fn delete(&self, id: &E::Id) -> Result<E, StoreError> {
        (**self).delete(id).await
    }
}

/// Handles onto one access-control store, one per concern.
#[derive(Clone)]
pub struct AccessStores {
    pub roles: Arc<dyn Repository<Role>>,
    pub permissions: Arc<dyn Repository<Permission>>,
    pub users: Arc<dyn Repository<User>>,
    pub links: Arc<dyn LinkStore>,
}

impl AccessStores {
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryAccessStore::new()))
    }

    pub fn postgres(store: PostgresAccessStore) -> Self {
        Self::from_store(Arc::new(store))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: Repository<Role> + Repository<Permission> + Repository<User> + LinkStore + 'static,
    {
        Self {
            roles: store.clone(),
            permissions: store.clone(),
            users: store.clone(),
            links: store,
        }
    }
}

impl core::fmt::Debug for AccessStores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessStores").finish_non_exhaustive()
    }
}
