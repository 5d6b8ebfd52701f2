use std::collections::BTreeSet;

use tracing::{error, info, instrument, warn};

use hrgate_audit::AuditCapture;
use hrgate_auth::{NewRole, Role, RoleUpdate};
use hrgate_core::RoleId;
use hrgate_infra::{CacheKey, Repository};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext, authz};

impl PermissionAdmin {
    /// Create a role in the caller's tenant (or the tenant the draft names,
    /// which must be the caller's own unless the caller is unrestricted).
    #[instrument(skip_all, fields(scope = %ctx.scope(), role = %draft.name))]
    pub async fn create_role(&self, ctx: &RequestContext, draft: NewRole) -> Result<Role, AdminError> {
        let mut draft = draft.validated()?;
        if draft.is_system_role {
            authz::require_unrestricted(ctx, "create_system_role")?;
        }
        let requested = draft.tenant_id;
        draft.tenant_id = ctx.scope().tenant_for_new(requested).map_err(|e| {
            warn!(requested = ?requested, "role creation in foreign tenant refused");
            AdminError::from(e)
        })?;

        let mut capture = AuditCapture::new(ctx.actor());
        let staged = capture.added(&draft);
        let role = self.roles(ctx).insert(draft).await?;

        if let Some(staged) = staged {
            if let Err(err) = capture.backfill_key(staged, role.id) {
                error!(role_id = %role.id, error = %err, "audit id backfill failed");
            }
        }
        capture.persist(self.audit.as_ref()).await;

        info!(role_id = %role.id, tenant_id = ?role.tenant_id, "role created");
        Ok(role)
    }

    /// Update a role's descriptive fields. Only changed fields are audited.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn update_role(&self, ctx: &RequestContext, role_id: RoleId, update: RoleUpdate) -> Result<Role, AdminError> {
        let before = self.mutable_role(ctx, role_id).await?;
        let after = before.updated(&update)?;
        if after == before {
            return Ok(before);
        }

        let updated = self.roles(ctx).update(after).await?;

        let mut capture = AuditCapture::new(ctx.actor());
        capture.modified(&before, &updated);
        capture.persist(self.audit.as_ref()).await;

        // Holders' effective sets depend on the active flag.
        if before.is_active != updated.is_active {
            self.invalidate_role(role_id).await?;
        }
        info!("role updated");
        Ok(updated)
    }

    /// Delete a role together with its permission and holder links.
    ///
    /// The links are audited and their cache keys dropped as soon as the
    /// detach commits, so a failing row delete leaves an audited, linkless
    /// role that can be deleted again.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn delete_role(&self, ctx: &RequestContext, role_id: RoleId) -> Result<Role, AdminError> {
        let role = self.mutable_role(ctx, role_id).await?;

        let detached = self.stores.links.detach_role(&role).await?;

        let mut capture = AuditCapture::new(ctx.actor());
        for link in &detached.permissions {
            capture.deleted(link);
        }
        for link in &detached.users {
            capture.deleted(link);
        }
        capture.persist(self.audit.as_ref()).await;

        // The reverse index no longer lists the holders; use the detached links.
        let mut keys = vec![CacheKey::AllPermissions, CacheKey::RolePermissions(role_id)];
        let holders: BTreeSet<_> = detached.users.iter().map(|link| link.user_id).collect();
        keys.extend(holders.into_iter().map(CacheKey::UserPermissions));
        self.cache.invalidate(&keys).await;

        let deleted = match self.roles(ctx).delete(&role.id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                error!(
                    error = %err,
                    permissions = detached.permissions.len(),
                    holders = detached.users.len(),
                    "role links removed but the role row was not deleted"
                );
                return Err(err.into());
            }
        };

        let mut capture = AuditCapture::new(ctx.actor());
        capture.deleted(&deleted);
        capture.persist(self.audit.as_ref()).await;

        info!(
            permissions = detached.permissions.len(),
            holders = detached.users.len(),
            "role deleted"
        );
        Ok(deleted)
    }

    /// Roles visible to the caller: its own tenant's plus shared global roles.
    pub async fn list_roles(&self, ctx: &RequestContext) -> Result<Vec<Role>, AdminError> {
        let mut roles = self.roles(ctx).list().await?;
        roles.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
        Ok(roles)
    }

    pub async fn get_role(&self, ctx: &RequestContext, role_id: RoleId) -> Result<Role, AdminError> {
        self.load_role(ctx, role_id).await
    }
}
