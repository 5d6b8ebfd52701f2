use tracing::{error, info, instrument, warn};

use hrgate_audit::AuditCapture;
use hrgate_auth::{NewPermission, Permission, PermissionCode};
use hrgate_core::PermissionId;
use hrgate_infra::{CacheKey, Repository};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext, authz};

impl PermissionAdmin {
    /// Add a permission to the global catalog. Codes are unique.
    #[instrument(skip_all, fields(scope = %ctx.scope(), code = %draft.code))]
    pub async fn create_permission(&self, ctx: &RequestContext, draft: NewPermission) -> Result<Permission, AdminError> {
        authz::require_unrestricted(ctx, "create_permission")?;
        let draft = NewPermission {
            code: PermissionCode::parse(draft.code.as_str())?,
            ..draft
        };

        let mut capture = AuditCapture::new(ctx.actor());
        let staged = capture.added(&draft);
        let permission = self.stores.permissions.insert(draft).await?;

        if let Some(staged) = staged {
            if let Err(err) = capture.backfill_key(staged, permission.id) {
                error!(permission_id = %permission.id, error = %err, "audit id backfill failed");
            }
        }
        capture.persist(self.audit.as_ref()).await;

        self.cache.invalidate(&[CacheKey::AllPermissions]).await;
        info!(permission_id = %permission.id, "permission created");
        Ok(permission)
    }

    /// Soft-enable or soft-disable a permission.
    ///
    /// Existing links stay in place; a disabled permission just stops counting
    /// towards effective permissions and cannot be newly assigned.
    #[instrument(skip_all, fields(scope = %ctx.scope(), permission_id = %permission_id, is_active = is_active))]
    pub async fn set_permission_active(
        &self,
        ctx: &RequestContext,
        permission_id: PermissionId,
        is_active: bool,
    ) -> Result<Permission, AdminError> {
        authz::require_unrestricted(ctx, "set_permission_active")?;
        let before = self
            .stores
            .permissions
            .get(&permission_id)
            .await?
            .ok_or(AdminError::NotFound)?;
        if before.is_active == is_active {
            return Ok(before);
        }

        let updated = self
            .stores
            .permissions
            .update(Permission {
                is_active,
                ..before.clone()
            })
            .await?;

        let mut capture = AuditCapture::new(ctx.actor());
        capture.modified(&before, &updated);
        capture.persist(self.audit.as_ref()).await;

        let referencing = self.stores.links.roles_referencing_permission(permission_id).await?;
        self.invalidate_roles(&referencing).await?;
        self.cache.invalidate(&[CacheKey::AllPermissions]).await;

        info!(roles = referencing.len(), "permission active flag changed");
        Ok(updated)
    }

    /// Hard-delete a permission nobody references.
    #[instrument(skip_all, fields(scope = %ctx.scope(), permission_id = %permission_id))]
    pub async fn delete_permission(&self, ctx: &RequestContext, permission_id: PermissionId) -> Result<Permission, AdminError> {
        authz::require_unrestricted(ctx, "delete_permission")?;
        let permission = self
            .stores
            .permissions
            .get(&permission_id)
            .await?
            .ok_or(AdminError::NotFound)?;

        let referencing = self.stores.links.roles_referencing_permission(permission_id).await?;
        if !referencing.is_empty() {
            warn!(roles = referencing.len(), "refusing to delete a referenced permission");
            return Err(AdminError::ValidationFailed(format!(
                "permission '{}' is referenced by {} role(s); disable it instead",
                permission.code,
                referencing.len()
            )));
        }

        let deleted = self.stores.permissions.delete(&permission_id).await?;

        let mut capture = AuditCapture::new(ctx.actor());
        capture.deleted(&deleted);
        capture.persist(self.audit.as_ref()).await;

        self.cache.invalidate(&[CacheKey::AllPermissions]).await;
        info!("permission deleted");
        Ok(deleted)
    }

    /// The whole catalog, ordered by code. Readable by every caller.
    pub async fn list_permissions(&self, _ctx: &RequestContext) -> Result<Vec<Permission>, AdminError> {
        let catalog = self.catalog().await?;
        let mut permissions: Vec<Permission> = catalog.iter().cloned().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }
}
