use hrgate_auth::Principal;
use hrgate_core::{SystemOperation, TenantScope, UserId};

use crate::AdminError;

/// Caller context for one operation.
///
/// Immutable; built either from an authenticated principal or for a
/// whitelisted system operation. There is no way to build an unrestricted
/// context from a request that simply lacks tenant information.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    scope: TenantScope,
    actor: Option<UserId>,
}

impl RequestContext {
    pub fn from_principal(principal: &Principal) -> Result<Self, AdminError> {
        Ok(Self {
            scope: principal.scope()?,
            actor: Some(principal.user_id),
        })
    }

    pub fn system(operation: SystemOperation) -> Self {
        Self {
            scope: TenantScope::system(operation),
            actor: None,
        }
    }

    pub fn scope(&self) -> TenantScope {
        self.scope
    }

    /// User recorded as the actor on audit records.
    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrgate_core::TenantId;

    #[test]
    fn tenant_principal_is_restricted_to_its_tenant() {
        let tenant = TenantId::new();
        let principal = Principal::for_tenant(UserId::new(), tenant);
        let ctx = RequestContext::from_principal(&principal).unwrap();
        assert_eq!(ctx.scope(), TenantScope::Tenant(tenant));
        assert_eq!(ctx.actor(), Some(principal.user_id));
    }

    #[test]
    fn principal_without_tenant_is_refused() {
        let principal = Principal {
            user_id: UserId::new(),
            tenant_id: None,
            is_master: false,
        };
        assert_eq!(RequestContext::from_principal(&principal), Err(AdminError::Unauthorized));
    }

    #[test]
    fn system_context_has_no_actor() {
        let ctx = RequestContext::system(SystemOperation::Seeding);
        assert!(ctx.scope().is_unrestricted());
        assert_eq!(ctx.actor(), None);
    }
}
