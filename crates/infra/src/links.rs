//! Role-permission and user-role link storage.
//!
//! Delta computation and the write happen inside one atomic unit of the
//! backing store, together with the permission-set guard. Two concurrent
//! "grant X" calls therefore cannot both observe X as missing.

use std::collections::BTreeSet;

use async_trait::async_trait;

use hrgate_auth::{Role, RolePermission, User, UserRole};
use hrgate_core::{PermissionId, RoleId, UserId};

use crate::StoreError;

/// Check run against a role's resulting permission set, inside the write's
/// atomic unit and before anything is written.
pub trait PermissionSetGuard: Send + Sync {
    fn check(&self, resulting: &BTreeSet<PermissionId>) -> Result<(), StoreError>;
}

impl<F> PermissionSetGuard for F
where
    F: Fn(&BTreeSet<PermissionId>) -> Result<(), StoreError> + Send + Sync,
{
    fn check(&self, resulting: &BTreeSet<PermissionId>) -> Result<(), StoreError> {
        self(resulting)
    }
}

/// Guard that accepts every set.
#[derive(Debug, Default, Copy, Clone)]
pub struct AcceptAll;

impl PermissionSetGuard for AcceptAll {
    fn check(&self, _resulting: &BTreeSet<PermissionId>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Links written by a replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDelta {
    pub added: Vec<RolePermission>,
    pub removed: Vec<RolePermission>,
}

impl LinkDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Links removed when a role is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDetachment {
    pub permissions: Vec<RolePermission>,
    pub users: Vec<UserRole>,
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn role_permissions(&self, role_id: RoleId) -> Result<BTreeSet<PermissionId>, StoreError>;

    /// Grant the requested permissions the role does not hold yet.
    ///
    /// Every requested permission must exist and be active. Returns only the
    /// links actually written; an empty result is a no-op.
    async fn grant_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError>;

    /// Revoke the requested permissions the role currently holds.
    async fn revoke_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError>;

    /// Make the role's set exactly `target`.
    async fn replace_permissions(
        &self,
        role: &Role,
        target: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<LinkDelta, StoreError>;

    async fn roles_referencing_permission(&self, permission_id: PermissionId) -> Result<BTreeSet<RoleId>, StoreError>;

    async fn user_roles(&self, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError>;

    /// Reverse index: holders of a role.
    async fn users_with_role(&self, role_id: RoleId) -> Result<BTreeSet<UserId>, StoreError>;

    async fn assign_roles(&self, user: &User, roles: &[Role]) -> Result<Vec<UserRole>, StoreError>;

    async fn unassign_roles(&self, user: &User, role_ids: &BTreeSet<RoleId>) -> Result<Vec<UserRole>, StoreError>;

    /// Drop every link of a role ahead of deleting it.
    async fn detach_role(&self, role: &Role) -> Result<RoleDetachment, StoreError>;
}

pub(crate) fn role_link(role: &Role, permission_id: PermissionId) -> RolePermission {
    RolePermission {
        role_id: role.id,
        permission_id,
        tenant_id: role.tenant_id,
    }
}

pub(crate) fn user_link(user: &User, role_id: RoleId) -> UserRole {
    UserRole {
        user_id: user.id,
        role_id,
        tenant_id: user.tenant_id,
    }
}

/// Resulting set and delta of a replace, guard not yet applied.
pub(crate) fn replace_delta(
    current: &BTreeSet<PermissionId>,
    target: &BTreeSet<PermissionId>,
) -> (Vec<PermissionId>, Vec<PermissionId>) {
    let added = target.difference(current).copied().collect();
    let removed = current.difference(target).copied().collect();
    (added, removed)
}
