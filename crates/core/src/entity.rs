//! Entity capabilities: identity, creation drafts and tenant ownership.

use crate::TenantId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Creation payload. The identifier is assigned by the store on insert, so a
    /// draft carries everything except the id.
    type Draft: Send + Sync + 'static;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Capability tag for tenant-owned records.
///
/// Any type implementing this is subject to row-level tenant isolation at the
/// data-access boundary. `None` means the record is tenant-less (system level,
/// visible to every tenant, writable only by master or system callers).
pub trait TenantOwned {
    /// Whether tenant-less instances are readable by every tenant.
    ///
    /// True for shared catalog-like records (global roles). Types whose
    /// tenant-less instances are operational data override this to `false`, which
    /// restricts them to master and system callers.
    const TENANTLESS_IS_SHARED: bool = true;

    fn tenant_id(&self) -> Option<TenantId>;
}

/// Creation payload of a tenant-owned record.
///
/// The requested tenant is resolved against the caller's scope before insert and
/// the resolved value is stamped back onto the draft.
pub trait TenantDraft {
    fn requested_tenant(&self) -> Option<TenantId>;

    fn stamp_tenant(&mut self, tenant_id: Option<TenantId>);
}
