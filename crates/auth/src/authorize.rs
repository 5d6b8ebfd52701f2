use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use hrgate_core::{TenantId, UserId};

use crate::PermissionCode;

/// A user's effective permission codes within their tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub codes: BTreeSet<PermissionCode>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check a single required permission against a user's effective set.
///
/// - No IO
/// - No panics
pub fn authorize(effective: &EffectivePermissions, required: &PermissionCode) -> Result<(), AuthzError> {
    if effective.codes.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
