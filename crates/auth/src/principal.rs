use serde::{Deserialize, Serialize};

use hrgate_core::{DomainResult, TenantId, TenantScope, UserId};

/// An authenticated caller.
///
/// Produced by the token layer outside this crate; only the identity, the tenant
/// the caller acts within and the master flag matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    /// Master / super-admin callers see every tenant.
    pub is_master: bool,
}

impl Principal {
    pub fn for_tenant(user_id: UserId, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            is_master: false,
        }
    }

    pub fn master(user_id: UserId) -> Self {
        Self {
            user_id,
            tenant_id: None,
            is_master: true,
        }
    }

    /// Tenant restriction for this caller's requests.
    pub fn scope(&self) -> DomainResult<TenantScope> {
        TenantScope::for_request(self.tenant_id, self.is_master)
    }
}
