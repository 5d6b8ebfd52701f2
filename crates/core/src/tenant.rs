//! Caller tenant context and the row-level isolation predicate.
//!
//! Every read or write of a [`TenantOwned`] record is decided here; storage
//! adapters only compose these checks, they never re-derive them.

use crate::{DomainError, DomainResult, TenantId, TenantOwned};

/// Operations allowed to run without an authenticated principal.
///
/// This is a closed whitelist. Normal request paths cannot obtain an
/// unrestricted scope by omitting tenant context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SystemOperation {
    Seeding,
    Migration,
}

impl core::fmt::Display for SystemOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SystemOperation::Seeding => f.write_str("seeding"),
            SystemOperation::Migration => f.write_str("migration"),
        }
    }
}

/// The tenant restriction under which an operation executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Regular caller: sees its own tenant's rows plus shared tenant-less rows.
    Tenant(TenantId),
    /// Master / super-admin caller: no read restriction.
    Master,
    /// Whitelisted background operation with no principal.
    System(SystemOperation),
}

impl TenantScope {
    /// Derive the scope of an authenticated request.
    ///
    /// A non-master caller without a tenant is refused; absence of tenant
    /// context is never an implicit bypass.
    pub fn for_request(tenant_id: Option<TenantId>, is_master: bool) -> DomainResult<Self> {
        if is_master {
            return Ok(Self::Master);
        }
        match tenant_id {
            Some(tenant_id) => Ok(Self::Tenant(tenant_id)),
            None => Err(DomainError::Unauthorized),
        }
    }

    pub fn system(operation: SystemOperation) -> Self {
        Self::System(operation)
    }

    /// The restricting tenant, if any.
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Tenant(tenant_id) => Some(*tenant_id),
            Self::Master | Self::System(_) => None,
        }
    }

    /// Master and whitelisted system operations.
    pub fn is_unrestricted(&self) -> bool {
        !matches!(self, Self::Tenant(_))
    }

    /// Row-level read predicate.
    pub fn can_read<E: TenantOwned>(&self, entity: &E) -> bool {
        match self {
            Self::Tenant(tenant_id) => match entity.tenant_id() {
                Some(owner) => owner == *tenant_id,
                None => E::TENANTLESS_IS_SHARED,
            },
            Self::Master | Self::System(_) => true,
        }
    }

    /// Row-level write predicate. Tenant-less rows are writable only by
    /// unrestricted callers.
    pub fn can_write<E: TenantOwned>(&self, entity: &E) -> bool {
        match self {
            Self::Tenant(tenant_id) => entity.tenant_id() == Some(*tenant_id),
            Self::Master | Self::System(_) => true,
        }
    }

    /// Resolve the tenant a newly created record is tagged with.
    ///
    /// Regular callers get an unset tenant auto-populated; asking for another
    /// tenant is an authorization failure, never a silent overwrite. Unrestricted
    /// callers keep exactly what the request states.
    pub fn tenant_for_new(&self, requested: Option<TenantId>) -> DomainResult<Option<TenantId>> {
        match self {
            Self::Tenant(tenant_id) => match requested {
                None => Ok(Some(*tenant_id)),
                Some(requested) if requested == *tenant_id => Ok(Some(requested)),
                Some(_) => Err(DomainError::Unauthorized),
            },
            Self::Master | Self::System(_) => Ok(requested),
        }
    }
}

impl core::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Tenant(tenant_id) => write!(f, "tenant:{tenant_id}"),
            Self::Master => f.write_str("master"),
            Self::System(operation) => write!(f, "system:{operation}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(Option<TenantId>);

    impl TenantOwned for Row {
        fn tenant_id(&self) -> Option<TenantId> {
            self.0
        }
    }

    struct PrivateRow(Option<TenantId>);

    impl TenantOwned for PrivateRow {
        const TENANTLESS_IS_SHARED: bool = false;

        fn tenant_id(&self) -> Option<TenantId> {
            self.0
        }
    }

    #[test]
    fn missing_tenant_context_is_refused() {
        assert_eq!(TenantScope::for_request(None, false), Err(DomainError::Unauthorized));
        assert_eq!(TenantScope::for_request(None, true), Ok(TenantScope::Master));
    }

    #[test]
    fn tenant_reads_own_and_shared_rows_only() {
        let a = TenantId::new();
        let b = TenantId::new();
        let scope = TenantScope::Tenant(a);

        assert!(scope.can_read(&Row(Some(a))));
        assert!(scope.can_read(&Row(None)));
        assert!(!scope.can_read(&Row(Some(b))));
        assert!(!scope.can_read(&PrivateRow(None)));
    }

    #[test]
    fn tenant_cannot_write_shared_rows() {
        let a = TenantId::new();
        let scope = TenantScope::Tenant(a);

        assert!(scope.can_write(&Row(Some(a))));
        assert!(!scope.can_write(&Row(None)));
        assert!(TenantScope::Master.can_write(&Row(None)));
    }

    #[test]
    fn new_records_get_caller_tenant() {
        let a = TenantId::new();
        let b = TenantId::new();
        let scope = TenantScope::Tenant(a);

        assert_eq!(scope.tenant_for_new(None), Ok(Some(a)));
        assert_eq!(scope.tenant_for_new(Some(a)), Ok(Some(a)));
        assert_eq!(scope.tenant_for_new(Some(b)), Err(DomainError::Unauthorized));
    }

    #[test]
    fn master_writes_keep_requested_tenant() {
        let b = TenantId::new();
        assert_eq!(TenantScope::Master.tenant_for_new(Some(b)), Ok(Some(b)));
        assert_eq!(TenantScope::Master.tenant_for_new(None), Ok(None));
        assert_eq!(
            TenantScope::system(SystemOperation::Seeding).tenant_for_new(None),
            Ok(None)
        );
    }
}
