//! `hrgate-core` — foundation building blocks shared by every hrgate crate.
//!
//! Identifiers, the domain error taxonomy, entity capabilities and the caller's
//! tenant scope. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod tenant;

pub use entity::{Entity, TenantDraft, TenantOwned};
pub use error::{DomainError, DomainResult};
pub use id::{AuditRecordId, PermissionId, RoleId, TenantId, UserId};
pub use tenant::{SystemOperation, TenantScope};
