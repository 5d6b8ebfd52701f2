use std::collections::BTreeSet;

use tracing::{error, info, instrument, warn};

use hrgate_audit::AuditCapture;
use hrgate_auth::{NewUser, Role, User, UserRole};
use hrgate_core::{RoleId, UserId};
use hrgate_infra::{CacheKey, Repository};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext};

impl PermissionAdmin {
    /// Create the minimal user record role links hang off.
    #[instrument(skip_all, fields(scope = %ctx.scope()))]
    pub async fn register_user(&self, ctx: &RequestContext, draft: NewUser) -> Result<User, AdminError> {
        let mut draft = draft.validated()?;
        let requested = draft.tenant_id;
        draft.tenant_id = ctx.scope().tenant_for_new(requested).map_err(|e| {
            warn!(requested = ?requested, "user registration in foreign tenant refused");
            AdminError::from(e)
        })?;

        let mut capture = AuditCapture::new(ctx.actor());
        let staged = capture.added(&draft);
        let user = self.users(ctx).insert(draft).await?;

        if let Some(staged) = staged {
            if let Err(err) = capture.backfill_key(staged, user.id) {
                error!(user_id = %user.id, error = %err, "audit id backfill failed");
            }
        }
        capture.persist(self.audit.as_ref()).await;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Give a user roles. Already-held roles are skipped; each new link is
    /// audited on its own.
    #[instrument(skip_all, fields(scope = %ctx.scope(), user_id = %user_id))]
    pub async fn assign_roles_to_user(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<Vec<UserRole>, AdminError> {
        let user = self.writable_user(ctx, user_id).await?;

        let mut roles: Vec<Role> = Vec::with_capacity(role_ids.len());
        for role_id in role_ids.iter().collect::<BTreeSet<_>>() {
            let role = self.load_role(ctx, *role_id).await?;
            if role.tenant_id.is_some() && role.tenant_id != user.tenant_id {
                warn!(role_id = %role.id, "role from another tenant cannot be held");
                return Err(AdminError::NotFound);
            }
            if !role.is_active {
                return Err(AdminError::ValidationFailed(format!("role '{}' is inactive", role.name)));
            }
            roles.push(role);
        }

        let added = self.stores.links.assign_roles(&user, &roles).await?;
        self.finish_user_links(ctx, user.id, &added, &[]).await;
        info!(added = added.len(), "roles assigned");
        Ok(added)
    }

    /// Take roles away from a user. Roles the user does not hold are ignored.
    #[instrument(skip_all, fields(scope = %ctx.scope(), user_id = %user_id))]
    pub async fn remove_roles_from_user(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<Vec<UserRole>, AdminError> {
        let user = self.writable_user(ctx, user_id).await?;
        let requested: BTreeSet<RoleId> = role_ids.iter().copied().collect();

        let removed = self.stores.links.unassign_roles(&user, &requested).await?;
        self.finish_user_links(ctx, user.id, &[], &removed).await;
        info!(removed = removed.len(), "roles removed");
        Ok(removed)
    }

    async fn writable_user(&self, ctx: &RequestContext, user_id: UserId) -> Result<User, AdminError> {
        let user = self.load_user(ctx, user_id).await?;
        if !ctx.scope().can_write(&user) {
            warn!(user_id = %user.id, "write to user outside caller tenant refused");
            return Err(AdminError::Unauthorized);
        }
        Ok(user)
    }

    async fn finish_user_links(&self, ctx: &RequestContext, user_id: UserId, added: &[UserRole], removed: &[UserRole]) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let mut capture = AuditCapture::new(ctx.actor());
        for link in added {
            capture.added(link);
        }
        for link in removed {
            capture.deleted(link);
        }
        capture.persist(self.audit.as_ref()).await;
        self.cache.invalidate(&[CacheKey::UserPermissions(user_id)]).await;
    }
}
