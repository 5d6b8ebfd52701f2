use thiserror::Error;

use hrgate_core::DomainError;

/// Storage-layer failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Missing, or hidden from the caller by tenant isolation.
    #[error("not found")]
    NotFound,

    /// Unique key violation (role name within tenant, permission code).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Refused by a store-level rule or by the permission-set guard.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Write targeting another tenant, or a shared row the caller may not touch.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        StoreError::Storage("lock poisoned".to_string())
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => StoreError::NotFound,
            DomainError::Unauthorized => StoreError::TenantIsolation("caller scope refused".to_string()),
            DomainError::Conflict(msg) => StoreError::Storage(msg),
            DomainError::Immutable(msg) | DomainError::ValidationFailed(msg) | DomainError::Configuration(msg) => {
                StoreError::Rejected(msg)
            }
        }
    }
}
