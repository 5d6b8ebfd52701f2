//! In-memory access-control store for tests/dev.
//!
//! All state sits behind one lock, so the link delta, the guard and the write
//! (plus the role → users reverse index) always change together.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use hrgate_auth::{NewPermission, NewRole, NewUser, Permission, Role, RolePermission, User, UserRole};
use hrgate_core::{Entity, PermissionId, RoleId, UserId};

use crate::links::{replace_delta, role_link, user_link};
use crate::{LinkDelta, LinkStore, PermissionSetGuard, Repository, RoleDetachment, StoreError};

#[derive(Debug, Default)]
struct AccessState {
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    users: BTreeMap<UserId, User>,
    role_permissions: BTreeMap<RoleId, BTreeSet<PermissionId>>,
    user_roles: BTreeMap<UserId, BTreeSet<RoleId>>,
    role_users: BTreeMap<RoleId, BTreeSet<UserId>>,
}

/// Per-entity table access plus the store-level rules of that table.
trait Table<E: Entity> {
    fn rows(&self) -> &BTreeMap<E::Id, E>;

    fn rows_mut(&mut self) -> &mut BTreeMap<E::Id, E>;

    fn materialize(draft: E::Draft) -> E;

    fn check_unique(&self, candidate: &E) -> Result<(), StoreError>;

    fn check_delete(&self, id: &E::Id) -> Result<(), StoreError>;
}

impl Table<Role> for AccessState {
    fn rows(&self) -> &BTreeMap<RoleId, Role> {
        &self.roles
    }

    fn rows_mut(&mut self) -> &mut BTreeMap<RoleId, Role> {
        &mut self.roles
    }

    fn materialize(draft: NewRole) -> Role {
        draft.into_role(RoleId::new())
    }

    fn check_unique(&self, candidate: &Role) -> Result<(), StoreError> {
        let taken = self.roles.values().any(|r| {
            r.id != candidate.id && r.tenant_id == candidate.tenant_id && r.name.eq_ignore_ascii_case(&candidate.name)
        });
        if taken {
            return Err(StoreError::Duplicate(format!("role name '{}' already exists", candidate.name)));
        }
        Ok(())
    }

    fn check_delete(&self, id: &RoleId) -> Result<(), StoreError> {
        let linked = self.role_permissions.get(id).is_some_and(|p| !p.is_empty())
            || self.role_users.get(id).is_some_and(|u| !u.is_empty());
        if linked {
            return Err(StoreError::Rejected("role still has links".to_string()));
        }
        Ok(())
    }
}

impl Table<Permission> for AccessState {
    fn rows(&self) -> &BTreeMap<PermissionId, Permission> {
        &self.permissions
    }

    fn rows_mut(&mut self) -> &mut BTreeMap<PermissionId, Permission> {
        &mut self.permissions
    }

    fn materialize(draft: NewPermission) -> Permission {
        draft.into_permission(PermissionId::new())
    }

    fn check_unique(&self, candidate: &Permission) -> Result<(), StoreError> {
        let taken = self
            .permissions
            .values()
            .any(|p| p.id != candidate.id && p.code == candidate.code);
        if taken {
            return Err(StoreError::Duplicate(format!("permission code '{}' already exists", candidate.code)));
        }
        Ok(())
    }

    fn check_delete(&self, id: &PermissionId) -> Result<(), StoreError> {
        if self.role_permissions.values().any(|set| set.contains(id)) {
            return Err(StoreError::Rejected("permission is referenced by a role".to_string()));
        }
        Ok(())
    }
}

impl Table<User> for AccessState {
    fn rows(&self) -> &BTreeMap<UserId, User> {
        &self.users
    }

    fn rows_mut(&mut self) -> &mut BTreeMap<UserId, User> {
        &mut self.users
    }

    fn materialize(draft: NewUser) -> User {
        draft.into_user(UserId::new())
    }

    fn check_unique(&self, _candidate: &User) -> Result<(), StoreError> {
        Ok(())
    }

    fn check_delete(&self, id: &UserId) -> Result<(), StoreError> {
        if self.user_roles.get(id).is_some_and(|r| !r.is_empty()) {
            return Err(StoreError::Rejected("user still holds roles".to_string()));
        }
        Ok(())
    }
}

/// In-memory access-control store.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    state: RwLock<AccessState>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, AccessState>, StoreError> {
        self.state.read().map_err(|_| StoreError::poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, AccessState>, StoreError> {
        self.state.write().map_err(|_| StoreError::poisoned())
    }
}

macro_rules! in_memory_repository {
    ($entity:ty) => {
        #[async_trait]
        impl Repository<$entity> for InMemoryAccessStore {
            async fn get(&self, id: &<$entity as Entity>::Id) -> Result<Option<$entity>, StoreError> {
                let state = self.read()?;
                Ok(<AccessState as Table<$entity>>::rows(&state).get(id).cloned())
            }

            async fn list(&self) -> Result<Vec<$entity>, StoreError> {
                let state = self.read()?;
                Ok(<AccessState as Table<$entity>>::rows(&state).values().cloned().collect())
            }

            async fn insert(&self, draft: <$entity as Entity>::Draft) -> Result<$entity, StoreError> {
                let mut state = self.write()?;
                let entity = <AccessState as Table<$entity>>::materialize(draft);
                <AccessState as Table<$entity>>::check_unique(&state, &entity)?;
                <AccessState as Table<$entity>>::rows_mut(&mut state).insert(entity.id, entity.clone());
                Ok(entity)
            }

            async fn update(&self, entity: $entity) -> Result<$entity, StoreError> {
                let mut state = self.write()?;
                if !<AccessState as Table<$entity>>::rows(&state).contains_key(&entity.id) {
                    return Err(StoreError::NotFound);
                }
                <AccessState as Table<$entity>>::check_unique(&state, &entity)?;
                <AccessState as Table<$entity>>::rows_mut(&mut state).insert(entity.id, entity.clone());
                Ok(entity)
            }

            async fn delete(&self, id: &<$entity as Entity>::Id) -> Result<$entity, StoreError> {
                let mut state = self.write()?;
                if !<AccessState as Table<$entity>>::rows(&state).contains_key(id) {
                    return Err(StoreError::NotFound);
                }
                <AccessState as Table<$entity>>::check_delete(&state, id)?;
                <AccessState as Table<$entity>>::rows_mut(&mut state)
                    .remove(id)
                    .ok_or(StoreError::NotFound)
            }
        }
    };
}

in_memory_repository!(Role);
in_memory_repository!(Permission);
in_memory_repository!(User);

impl AccessState {
    fn role_set(&self, role_id: RoleId) -> Result<BTreeSet<PermissionId>, StoreError> {
        if !self.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound);
        }
        Ok(self.role_permissions.get(&role_id).cloned().unwrap_or_default())
    }

    /// Links may only reference existing, active permissions.
    fn check_grantable(&self, ids: &[PermissionId]) -> Result<(), StoreError> {
        for id in ids {
            match self.permissions.get(id) {
                None => return Err(StoreError::NotFound),
                Some(p) if !p.is_active => {
                    return Err(StoreError::Rejected(format!("permission '{}' is inactive", p.code)));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn store_role_set(&mut self, role_id: RoleId, set: BTreeSet<PermissionId>) {
        if set.is_empty() {
            self.role_permissions.remove(&role_id);
        } else {
            self.role_permissions.insert(role_id, set);
        }
    }

    fn link_user(&mut self, user_id: UserId, role_id: RoleId) -> bool {
        let added = self.user_roles.entry(user_id).or_default().insert(role_id);
        if added {
            self.role_users.entry(role_id).or_default().insert(user_id);
        }
        added
    }

    fn unlink_user(&mut self, user_id: UserId, role_id: RoleId) -> bool {
        let removed = self.user_roles.get_mut(&user_id).is_some_and(|set| set.remove(&role_id));
        if removed {
            if let Some(users) = self.role_users.get_mut(&role_id) {
                users.remove(&user_id);
                if users.is_empty() {
                    self.role_users.remove(&role_id);
                }
            }
        }
        removed
    }
}

#[async_trait]
impl LinkStore for InMemoryAccessStore {
    async fn role_permissions(&self, role_id: RoleId) -> Result<BTreeSet<PermissionId>, StoreError> {
        self.read()?.role_set(role_id)
    }

    async fn grant_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError> {
        let mut state = self.write()?;
        let mut resulting = state.role_set(role.id)?;
        let added: Vec<PermissionId> = requested.difference(&resulting).copied().collect();
        if added.is_empty() {
            return Ok(Vec::new());
        }

        state.check_grantable(&added)?;
        resulting.extend(added.iter().copied());
        guard.check(&resulting)?;

        state.store_role_set(role.id, resulting);
        Ok(added.into_iter().map(|id| role_link(role, id)).collect())
    }

    async fn revoke_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError> {
        let mut state = self.write()?;
        let mut resulting = state.role_set(role.id)?;
        let removed: Vec<PermissionId> = requested.intersection(&resulting).copied().collect();
        if removed.is_empty() {
            return Ok(Vec::new());
        }

        for id in &removed {
            resulting.remove(id);
        }
        guard.check(&resulting)?;

        state.store_role_set(role.id, resulting);
        Ok(removed.into_iter().map(|id| role_link(role, id)).collect())
    }

    async fn replace_permissions(
        &self,
        role: &Role,
        target: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<LinkDelta, StoreError> {
        let mut state = self.write()?;
        let current = state.role_set(role.id)?;
        let (added, removed) = replace_delta(&current, target);
        if added.is_empty() && removed.is_empty() {
            return Ok(LinkDelta::default());
        }

        state.check_grantable(&added)?;
        guard.check(target)?;

        state.store_role_set(role.id, target.clone());
        Ok(LinkDelta {
            added: added.into_iter().map(|id| role_link(role, id)).collect(),
            removed: removed.into_iter().map(|id| role_link(role, id)).collect(),
        })
    }

    async fn roles_referencing_permission(&self, permission_id: PermissionId) -> Result<BTreeSet<RoleId>, StoreError> {
        Ok(self
            .read()?
            .role_permissions
            .iter()
            .filter(|(_, set)| set.contains(&permission_id))
            .map(|(role_id, _)| *role_id)
            .collect())
    }

    async fn user_roles(&self, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError> {
        Ok(self.read()?.user_roles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<BTreeSet<UserId>, StoreError> {
        Ok(self.read()?.role_users.get(&role_id).cloned().unwrap_or_default())
    }

    async fn assign_roles(&self, user: &User, roles: &[Role]) -> Result<Vec<UserRole>, StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) || roles.iter().any(|r| !state.roles.contains_key(&r.id)) {
            return Err(StoreError::NotFound);
        }

        let mut added = Vec::new();
        for role in roles {
            if state.link_user(user.id, role.id) {
                added.push(user_link(user, role.id));
            }
        }
        Ok(added)
    }

    async fn unassign_roles(&self, user: &User, role_ids: &BTreeSet<RoleId>) -> Result<Vec<UserRole>, StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }

        let mut removed = Vec::new();
        for role_id in role_ids {
            if state.unlink_user(user.id, *role_id) {
                removed.push(user_link(user, *role_id));
            }
        }
        Ok(removed)
    }

    async fn detach_role(&self, role: &Role) -> Result<RoleDetachment, StoreError> {
        let mut state = self.write()?;
        let permissions = state.role_set(role.id)?;
        state.role_permissions.remove(&role.id);

        let holders = state.role_users.get(&role.id).cloned().unwrap_or_default();
        let mut users = Vec::with_capacity(holders.len());
        for user_id in holders {
            state.unlink_user(user_id, role.id);
            let tenant_id = state.users.get(&user_id).and_then(|u| u.tenant_id);
            users.push(UserRole {
                user_id,
                role_id: role.id,
                tenant_id,
            });
        }

        Ok(RoleDetachment {
            permissions: permissions.into_iter().map(|id| role_link(role, id)).collect(),
            users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcceptAll;
    use hrgate_auth::PermissionCode;
    use hrgate_core::TenantId;
    use std::sync::Arc;

    async fn permission(store: &InMemoryAccessStore, code: &'static str) -> Permission {
        Repository::<Permission>::insert(store, NewPermission::from_code(PermissionCode::new(code)))
            .await
            .unwrap()
    }

    async fn role(store: &InMemoryAccessStore, tenant: TenantId, name: &str) -> Role {
        let mut draft = NewRole::new(name);
        draft.tenant_id = Some(tenant);
        Repository::<Role>::insert(store, draft).await.unwrap()
    }

    #[tokio::test]
    async fn grant_writes_only_the_delta() {
        let store = InMemoryAccessStore::new();
        let view = permission(&store, "USERS_VIEW").await;
        let delete = permission(&store, "USERS_DELETE").await;
        let r = role(&store, TenantId::new(), "HR").await;

        let first = store
            .grant_permissions(&r, &[view.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = store
            .grant_permissions(&r, &[view.id, delete.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();
        assert_eq!(second, vec![role_link(&r, delete.id)]);

        let again = store
            .grant_permissions(&r, &[view.id, delete.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(store.role_permissions(r.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn guard_rejection_leaves_links_untouched() {
        let store = InMemoryAccessStore::new();
        let view = permission(&store, "USERS_VIEW").await;
        let r = role(&store, TenantId::new(), "HR").await;

        let deny = |_: &BTreeSet<PermissionId>| -> Result<(), StoreError> { Err(StoreError::Rejected("no".to_string())) };
        let err = store
            .grant_permissions(&r, &[view.id].into_iter().collect(), &deny)
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::Rejected("no".to_string()));
        assert!(store.role_permissions(r.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_permission_cannot_be_linked() {
        let store = InMemoryAccessStore::new();
        let mut view = permission(&store, "USERS_VIEW").await;
        view.is_active = false;
        Repository::<Permission>::update(&store, view.clone()).await.unwrap();
        let r = role(&store, TenantId::new(), "HR").await;

        let err = store
            .grant_permissions(&r, &[view.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn role_names_are_unique_per_tenant() {
        let store = InMemoryAccessStore::new();
        let tenant = TenantId::new();
        role(&store, tenant, "HR").await;
        role(&store, TenantId::new(), "HR").await;

        let mut dup = NewRole::new("hr");
        dup.tenant_id = Some(tenant);
        let err = Repository::<Role>::insert(&store, dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn reverse_index_follows_user_role_links() {
        let store = Arc::new(InMemoryAccessStore::new());
        let tenant = TenantId::new();
        let r = role(&store, tenant, "HR").await;
        let mut draft = NewUser::new("Ana");
        draft.tenant_id = Some(tenant);
        let user = Repository::<User>::insert(&*store, draft).await.unwrap();

        let added = store.assign_roles(&user, std::slice::from_ref(&r)).await.unwrap();
        assert_eq!(added.len(), 1);
        assert!(store.assign_roles(&user, std::slice::from_ref(&r)).await.unwrap().is_empty());
        assert_eq!(store.users_with_role(r.id).await.unwrap(), [user.id].into_iter().collect());

        let removed = store
            .unassign_roles(&user, &[r.id].into_iter().collect())
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.users_with_role(r.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detach_returns_every_link_and_allows_delete() {
        let store = InMemoryAccessStore::new();
        let tenant = TenantId::new();
        let view = permission(&store, "USERS_VIEW").await;
        let r = role(&store, tenant, "HR").await;
        let mut draft = NewUser::new("Ana");
        draft.tenant_id = Some(tenant);
        let user = Repository::<User>::insert(&store, draft).await.unwrap();
        store
            .grant_permissions(&r, &[view.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();
        store.assign_roles(&user, std::slice::from_ref(&r)).await.unwrap();

        assert!(Repository::<Role>::delete(&store, &r.id).await.is_err());
        assert!(Repository::<Permission>::delete(&store, &view.id).await.is_err());

        let detached = store.detach_role(&r).await.unwrap();
        assert_eq!(detached.permissions.len(), 1);
        assert_eq!(detached.users.len(), 1);
        assert_eq!(Repository::<Role>::delete(&store, &r.id).await.unwrap().id, r.id);
        assert!(store.user_roles(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_computes_both_sides() {
        let store = InMemoryAccessStore::new();
        let view = permission(&store, "USERS_VIEW").await;
        let edit = permission(&store, "USERS_EDIT").await;
        let r = role(&store, TenantId::new(), "HR").await;
        store
            .grant_permissions(&r, &[view.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();

        let delta = store
            .replace_permissions(&r, &[edit.id].into_iter().collect(), &AcceptAll)
            .await
            .unwrap();
        assert_eq!(delta.added, vec![role_link(&r, edit.id)]);
        assert_eq!(delta.removed, vec![role_link(&r, view.id)]);
    }
}
