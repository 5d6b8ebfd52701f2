//! Caller-level guards applied before an operation touches storage.

use tracing::warn;

use hrgate_auth::Role;
use hrgate_core::{SystemOperation, TenantScope};

use crate::{AdminError, RequestContext};

/// Catalog-wide operations (permissions, system roles) need an unrestricted
/// caller.
pub fn require_unrestricted(ctx: &RequestContext, operation: &str) -> Result<(), AdminError> {
    if ctx.scope().is_unrestricted() {
        return Ok(());
    }
    warn!(scope = %ctx.scope(), operation, "operation requires an unrestricted caller");
    Err(AdminError::Unauthorized)
}

pub fn require_system(ctx: &RequestContext, operation: SystemOperation) -> Result<(), AdminError> {
    if ctx.scope() == TenantScope::System(operation) {
        return Ok(());
    }
    warn!(scope = %ctx.scope(), %operation, "system operation refused");
    Err(AdminError::Unauthorized)
}

/// System roles are immutable. Checked before any other work.
pub fn ensure_mutable(role: &Role) -> Result<(), AdminError> {
    role.ensure_mutable().map_err(|e| {
        warn!(role_id = %role.id, role = %role.name, "blocked mutation of system role");
        AdminError::from(e)
    })
}

/// Visible is not enough to write: shared tenant-less roles belong to
/// unrestricted callers.
pub fn ensure_writable(ctx: &RequestContext, role: &Role) -> Result<(), AdminError> {
    if ctx.scope().can_write(role) {
        return Ok(());
    }
    warn!(scope = %ctx.scope(), role_id = %role.id, "write to role outside caller tenant refused");
    Err(AdminError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrgate_auth::NewRole;
    use hrgate_core::{RoleId, TenantId};

    #[test]
    fn tenant_callers_cannot_run_catalog_operations() {
        let ctx = RequestContext::from_principal(&hrgate_auth::Principal::for_tenant(
            hrgate_core::UserId::new(),
            TenantId::new(),
        ))
        .unwrap();
        assert_eq!(require_unrestricted(&ctx, "create_permission"), Err(AdminError::Unauthorized));
        assert!(require_unrestricted(&RequestContext::system(SystemOperation::Seeding), "x").is_ok());
    }

    #[test]
    fn only_the_named_system_operation_passes() {
        let seeding = RequestContext::system(SystemOperation::Seeding);
        assert!(require_system(&seeding, SystemOperation::Seeding).is_ok());
        assert!(require_system(&seeding, SystemOperation::Migration).is_err());
    }

    #[test]
    fn system_roles_are_immutable() {
        let role = NewRole::new("GestorMaster").system().into_role(RoleId::new());
        assert!(matches!(ensure_mutable(&role), Err(AdminError::Immutable(_))));
    }
}
