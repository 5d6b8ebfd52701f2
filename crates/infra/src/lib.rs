//! Infrastructure layer: access-control storage, tenant isolation, caching.

pub mod cache;
pub mod error;
pub mod links;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod tenant_filter;

pub use cache::{CacheGeneration, CacheKey, CacheStats, CachedValue, InMemoryPermissionCache, PermissionCache};
pub use error::StoreError;
pub use links::{AcceptAll, LinkDelta, LinkStore, PermissionSetGuard, RoleDetachment};
pub use memory::InMemoryAccessStore;
pub use postgres::{PostgresAccessStore, PostgresAuditStore};
pub use repository::{AccessStores, Repository};
pub use tenant_filter::TenantFiltered;
