use std::collections::BTreeSet;

use tracing::instrument;

use hrgate_auth::{EffectivePermissions, Permission, PermissionCode, authorize};
use hrgate_core::{PermissionId, RoleId, UserId};
use hrgate_infra::{CacheKey, CachedValue, Repository};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext};

impl PermissionAdmin {
    /// Permissions linked to a role, including disabled ones.
    pub async fn get_role_permissions(&self, ctx: &RequestContext, role_id: RoleId) -> Result<Vec<Permission>, AdminError> {
        let role = self.load_role(ctx, role_id).await?;
        let ids = self.role_permission_ids(role.id).await?;
        let catalog = self.catalog().await?;
        let mut permissions: Vec<Permission> = ids.iter().filter_map(|id| catalog.get(id)).cloned().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }

    /// Union of the active permissions of the user's active roles.
    #[instrument(skip_all, fields(scope = %ctx.scope(), user_id = %user_id))]
    pub async fn get_user_permissions(&self, ctx: &RequestContext, user_id: UserId) -> Result<EffectivePermissions, AdminError> {
        let user = self.load_user(ctx, user_id).await?;
        let key = CacheKey::UserPermissions(user.id);

        let codes = match self.cache.get(&key).await {
            Some(CachedValue::PermissionCodes(codes)) => codes,
            _ => {
                let observed = self.cache.generation(&key).await;
                let codes = self.compute_user_codes(user.id).await?;
                self.cache
                    .put_if_current(key, CachedValue::PermissionCodes(codes.clone()), observed)
                    .await;
                codes
            }
        };

        Ok(EffectivePermissions {
            user_id: user.id,
            tenant_id: user.tenant_id,
            codes,
        })
    }

    /// Authorization decision for one code. Malformed codes are a validation
    /// error, not a denial.
    pub async fn has_permission(&self, ctx: &RequestContext, user_id: UserId, code: &str) -> Result<bool, AdminError> {
        let code = PermissionCode::parse(code)?;
        let effective = self.get_user_permissions(ctx, user_id).await?;
        Ok(authorize(&effective, &code).is_ok())
    }

    async fn compute_user_codes(&self, user_id: UserId) -> Result<BTreeSet<PermissionCode>, AdminError> {
        let role_ids = self.stores.links.user_roles(user_id).await?;
        let mut ids: BTreeSet<PermissionId> = BTreeSet::new();
        for role_id in role_ids {
            let active = self.stores.roles.get(&role_id).await?.is_some_and(|role| role.is_active);
            if active {
                ids.extend(self.role_permission_ids(role_id).await?);
            }
        }
        let catalog = self.catalog().await?;
        Ok(catalog.codes_of(&ids, true))
    }
}
