//! Row-level tenant isolation as a typed decorator.
//!
//! Any entity implementing [`TenantOwned`] (with a [`TenantDraft`] draft) gets
//! the filter by wrapping its repository; nothing is registered per type.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use hrgate_core::{Entity, TenantDraft, TenantOwned, TenantScope};

use crate::{Repository, StoreError};

/// Repository view constrained to one caller scope.
///
/// Reads of rows outside the scope behave as if the row did not exist. Writes
/// to such rows fail with `NotFound` for the same reason. Writes that would move
/// a row into another tenant, or touch a shared row, fail with
/// `TenantIsolation`.
pub struct TenantFiltered<E: Entity + Send + Sync + 'static> {
    inner: Arc<dyn Repository<E>>,
    scope: TenantScope,
}

impl<E> TenantFiltered<E>
where
    E: Entity + TenantOwned + Send + Sync + 'static,
{
    pub fn new(inner: Arc<dyn Repository<E>>, scope: TenantScope) -> Self {
        Self { inner, scope }
    }

    pub fn scope(&self) -> TenantScope {
        self.scope
    }

    /// Fetch a row the caller may write.
    async fn writable(&self, id: &E::Id) -> Result<E, StoreError> {
        let existing = self.inner.get(id).await?.ok_or(StoreError::NotFound)?;
        if !self.scope.can_read(&existing) {
            warn!(scope = %self.scope, entity_id = %id, "cross-tenant write refused");
            return Err(StoreError::NotFound);
        }
        if !self.scope.can_write(&existing) {
            warn!(scope = %self.scope, entity_id = %id, "write to shared row refused");
            return Err(StoreError::TenantIsolation(format!("{id} is not owned by the caller")));
        }
        Ok(existing)
    }
}

#[async_trait]
impl<E> Repository<E> for TenantFiltered<E>
where
    E: Entity + TenantOwned + Send + Sync + 'static,
    E::Draft: TenantDraft,
{
    async fn get(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        let found = self.inner.get(id).await?;
        Ok(found.filter(|entity| {
            let visible = self.scope.can_read(entity);
            if !visible {
                warn!(scope = %self.scope, entity_id = %id, "cross-tenant read hidden");
            }
            visible
        }))
    }

    async fn list(&self) -> Result<Vec<E>, StoreError> {
        let rows = self.inner.list().await?;
        Ok(rows.into_iter().filter(|entity| self.scope.can_read(entity)).collect())
    }

    async fn insert(&self, mut draft: E::Draft) -> Result<E, StoreError> {
        let requested = draft.requested_tenant();
        let tenant_id = self.scope.tenant_for_new(requested).map_err(|_| {
            warn!(scope = %self.scope, requested = ?requested, "create in foreign tenant refused");
            StoreError::TenantIsolation("cannot create records in another tenant".to_string())
        })?;
        draft.stamp_tenant(tenant_id);
        self.inner.insert(draft).await
    }

    async fn update(&self, entity: E) -> Result<E, StoreError> {
        let existing = self.writable(entity.id()).await?;
        if existing.tenant_id() != entity.tenant_id() {
            warn!(scope = %self.scope, entity_id = %entity.id(), "tenant reassignment refused");
            return Err(StoreError::TenantIsolation("a record's tenant cannot change".to_string()));
        }
        self.inner.update(entity).await
    }

    async fn delete(&self, id: &E::Id) -> Result<E, StoreError> {
        self.writable(id).await?;
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryAccessStore;
    use hrgate_auth::{NewRole, NewUser, Role, User};
    use hrgate_core::{SystemOperation, TenantId};

    fn roles(store: &Arc<InMemoryAccessStore>, scope: TenantScope) -> TenantFiltered<Role> {
        TenantFiltered::new(store.clone(), scope)
    }

    #[tokio::test]
    async fn tenant_is_auto_populated_on_create() {
        let store = Arc::new(InMemoryAccessStore::new());
        let tenant = TenantId::new();

        let role = roles(&store, TenantScope::Tenant(tenant)).insert(NewRole::new("HR")).await.unwrap();
        assert_eq!(role.tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn creating_in_another_tenant_is_refused() {
        let store = Arc::new(InMemoryAccessStore::new());
        let mut draft = NewRole::new("HR");
        draft.tenant_id = Some(TenantId::new());

        let err = roles(&store, TenantScope::Tenant(TenantId::new()))
            .insert(draft)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn master_writes_keep_the_explicit_tenant() {
        let store = Arc::new(InMemoryAccessStore::new());
        let target = TenantId::new();
        let mut draft = NewRole::new("HR");
        draft.tenant_id = Some(target);

        let role = roles(&store, TenantScope::Master).insert(draft).await.unwrap();
        assert_eq!(role.tenant_id, Some(target));

        let global = roles(&store, TenantScope::Master).insert(NewRole::new("Global")).await.unwrap();
        assert_eq!(global.tenant_id, None);
    }

    #[tokio::test]
    async fn foreign_rows_read_as_absent() {
        let store = Arc::new(InMemoryAccessStore::new());
        let (a, b) = (TenantId::new(), TenantId::new());
        let role_b = roles(&store, TenantScope::Tenant(b)).insert(NewRole::new("HR")).await.unwrap();

        let as_a = roles(&store, TenantScope::Tenant(a));
        assert_eq!(as_a.get(&role_b.id).await.unwrap(), None);
        assert!(as_a.list().await.unwrap().is_empty());
        assert_eq!(as_a.update(role_b.clone()).await.unwrap_err(), StoreError::NotFound);
        assert_eq!(as_a.delete(&role_b.id).await.unwrap_err(), StoreError::NotFound);

        let master = roles(&store, TenantScope::Master);
        assert_eq!(master.get(&role_b.id).await.unwrap(), Some(role_b));
    }

    #[tokio::test]
    async fn shared_rows_are_readable_but_not_writable() {
        let store = Arc::new(InMemoryAccessStore::new());
        let global = roles(&store, TenantScope::system(SystemOperation::Seeding))
            .insert(NewRole::new("Global"))
            .await
            .unwrap();

        let tenant = roles(&store, TenantScope::Tenant(TenantId::new()));
        assert_eq!(tenant.get(&global.id).await.unwrap(), Some(global.clone()));
        assert!(matches!(
            tenant.update(global.clone()).await.unwrap_err(),
            StoreError::TenantIsolation(_)
        ));
    }

    #[tokio::test]
    async fn tenant_cannot_be_reassigned_on_update() {
        let store = Arc::new(InMemoryAccessStore::new());
        let tenant = TenantId::new();
        let filtered = roles(&store, TenantScope::Tenant(tenant));
        let mut role = filtered.insert(NewRole::new("HR")).await.unwrap();

        role.tenant_id = None;
        assert!(matches!(filtered.update(role).await.unwrap_err(), StoreError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn any_tenant_owned_type_is_filtered() {
        let store = Arc::new(InMemoryAccessStore::new());
        let users: TenantFiltered<User> = TenantFiltered::new(store.clone(), TenantScope::Tenant(TenantId::new()));
        let user = users.insert(NewUser::new("Ana")).await.unwrap();

        let other: TenantFiltered<User> = TenantFiltered::new(store.clone(), TenantScope::Tenant(TenantId::new()));
        assert_eq!(other.get(&user.id).await.unwrap(), None);
    }
}
