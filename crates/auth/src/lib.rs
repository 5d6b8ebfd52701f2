//! `hrgate-auth` — access-control records and the authenticated caller.
//!
//! This crate is intentionally decoupled from storage. Token decoding and
//! password handling live outside; they hand over a [`Principal`].

pub mod authorize;
pub mod catalog;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, EffectivePermissions, authorize};
pub use catalog::{PermissionCatalog, ResolvedPermissions};
pub use permissions::{NewPermission, Permission, PermissionCode};
pub use principal::Principal;
pub use roles::{NewRole, Role, RolePermission, RoleUpdate};
pub use user::{NewUser, User, UserRole};
