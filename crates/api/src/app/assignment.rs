use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use hrgate_audit::AuditCapture;
use hrgate_auth::{PermissionCatalog, Role, RolePermission};
use hrgate_core::{PermissionId, RoleId};
use hrgate_infra::{LinkDelta, PermissionSetGuard};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext, authz};

impl PermissionAdmin {
    /// Grant permissions to a role. Only the missing ones are written, each
    /// with its own audit record; re-granting is a no-op.
    ///
    /// Fails with `Immutable` for system roles before anything else happens,
    /// `NotFound` for unknown ids or roles outside the caller's tenant, and
    /// `ValidationFailed` for inactive permissions or (when enforcement is on)
    /// a resulting set with error findings.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn assign_permissions_to_role(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<bool, AdminError> {
        let role = self.mutable_role(ctx, role_id).await?;
        let catalog = self.catalog().await?;
        let requested: BTreeSet<PermissionId> = permission_ids.iter().copied().collect();

        let resolved = catalog.resolve(&requested);
        if !resolved.unknown.is_empty() {
            warn!(unknown = ?resolved.unknown, "assignment references unknown permissions");
            return Err(AdminError::NotFound);
        }
        if !resolved.inactive.is_empty() {
            let codes: Vec<String> = resolved.inactive.iter().map(ToString::to_string).collect();
            return Err(AdminError::ValidationFailed(format!(
                "inactive permissions cannot be assigned: {}",
                codes.join(", ")
            )));
        }

        let guard = self.validation_guard(&catalog, &role);
        self.grant_links(ctx, &role, &requested, &guard).await?;
        Ok(true)
    }

    /// Revoke permissions from a role. Permissions the role does not hold are
    /// ignored.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn remove_permissions_from_role(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<bool, AdminError> {
        let role = self.mutable_role(ctx, role_id).await?;
        let catalog = self.catalog().await?;
        let requested: BTreeSet<PermissionId> = permission_ids.iter().copied().collect();
        ensure_known(&catalog, &requested)?;

        let guard = self.validation_guard(&catalog, &role);
        let removed = self.stores.links.revoke_permissions(&role, &requested, &guard).await?;
        if removed.is_empty() {
            debug!("role holds none of the requested permissions; nothing written");
            return Ok(true);
        }

        self.audit_links(ctx, &[], &removed).await;
        self.invalidate_role(role.id).await?;
        info!(removed = removed.len(), "permissions revoked");
        Ok(true)
    }

    /// Make the role's permission set exactly `permission_ids`, adding and
    /// removing in one atomic unit.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn replace_role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<LinkDelta, AdminError> {
        let role = self.mutable_role(ctx, role_id).await?;
        let catalog = self.catalog().await?;
        let target: BTreeSet<PermissionId> = permission_ids.iter().copied().collect();
        ensure_known(&catalog, &target)?;

        let guard = self.validation_guard(&catalog, &role);
        self.replace_links(ctx, &role, &target, &guard).await
    }

    /// Role the caller may change the permission set of.
    pub(crate) async fn mutable_role(&self, ctx: &RequestContext, role_id: RoleId) -> Result<Role, AdminError> {
        let role = self.load_role(ctx, role_id).await?;
        authz::ensure_mutable(&role)?;
        authz::ensure_writable(ctx, &role)?;
        Ok(role)
    }

    /// Store write, per-link audit and cache invalidation of a grant. Caller
    /// checks have already run.
    pub(crate) async fn grant_links(
        &self,
        ctx: &RequestContext,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, AdminError> {
        let added = self.stores.links.grant_permissions(role, requested, guard).await?;
        if added.is_empty() {
            debug!(role_id = %role.id, "role already holds the requested permissions; nothing written");
            return Ok(added);
        }

        self.audit_links(ctx, &added, &[]).await;
        self.invalidate_role(role.id).await?;
        info!(role_id = %role.id, added = added.len(), "permissions granted");
        Ok(added)
    }

    pub(crate) async fn replace_links(
        &self,
        ctx: &RequestContext,
        role: &Role,
        target: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<LinkDelta, AdminError> {
        let delta = self.stores.links.replace_permissions(role, target, guard).await?;
        if delta.is_empty() {
            debug!(role_id = %role.id, "role already holds exactly the target set; nothing written");
            return Ok(delta);
        }

        self.audit_links(ctx, &delta.added, &delta.removed).await;
        self.invalidate_role(role.id).await?;
        info!(
            role_id = %role.id,
            added = delta.added.len(),
            removed = delta.removed.len(),
            "role permissions replaced"
        );
        Ok(delta)
    }

    /// One record per link, never one per role.
    async fn audit_links(&self, ctx: &RequestContext, added: &[RolePermission], removed: &[RolePermission]) {
        let mut capture = AuditCapture::new(ctx.actor());
        for link in added {
            capture.added(link);
        }
        for link in removed {
            capture.deleted(link);
        }
        capture.persist(self.audit.as_ref()).await;
    }
}

fn ensure_known(catalog: &PermissionCatalog, ids: &BTreeSet<PermissionId>) -> Result<(), AdminError> {
    let unknown: Vec<&PermissionId> = ids.iter().filter(|id| catalog.get(id).is_none()).collect();
    if !unknown.is_empty() {
        warn!(unknown = ?unknown, "request references unknown permissions");
        return Err(AdminError::NotFound);
    }
    Ok(())
}
