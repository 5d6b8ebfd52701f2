use thiserror::Error;

use hrgate_audit::AuditStoreError;
use hrgate_core::DomainError;
use hrgate_infra::StoreError;
use hrgate_validation::RuleLoadError;

use crate::config::ConfigError;

/// Caller-facing error of every [`crate::PermissionAdmin`] operation.
///
/// Permission-set findings are never raised through this type; they travel in
/// a validation result. Only structural failures are errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Missing, or outside the caller's tenant. The two are indistinguishable.
    #[error("not found")]
    NotFound,

    #[error("immutable: {0}")]
    Immutable(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AdminError {
    /// Blocked system-role mutations and cross-tenant attempts.
    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::Immutable(_) | Self::Unauthorized)
    }

    /// Message safe to show an end user.
    pub fn public_message(&self) -> String {
        match self {
            Self::Immutable(_) | Self::Unauthorized => "not permitted".to_string(),
            Self::NotFound => "not found".to_string(),
            Self::ValidationFailed(msg) => format!("validation failed: {msg}"),
            Self::Conflict(_) => "the record was modified concurrently; retry".to_string(),
            Self::Configuration(_) | Self::Storage(_) => "internal error".to_string(),
        }
    }
}

impl From<DomainError> for AdminError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => AdminError::NotFound,
            DomainError::Immutable(msg) => AdminError::Immutable(msg),
            DomainError::ValidationFailed(msg) => AdminError::ValidationFailed(msg),
            DomainError::Unauthorized => AdminError::Unauthorized,
            DomainError::Conflict(msg) => AdminError::Conflict(msg),
            DomainError::Configuration(msg) => AdminError::Configuration(msg),
        }
    }
}

impl From<StoreError> for AdminError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => AdminError::NotFound,
            StoreError::Duplicate(msg) | StoreError::Rejected(msg) => AdminError::ValidationFailed(msg),
            StoreError::TenantIsolation(_) => AdminError::Unauthorized,
            StoreError::Storage(msg) => AdminError::Storage(msg),
        }
    }
}

impl From<AuditStoreError> for AdminError {
    fn from(value: AuditStoreError) -> Self {
        AdminError::Storage(value.to_string())
    }
}

impl From<RuleLoadError> for AdminError {
    fn from(value: RuleLoadError) -> Self {
        AdminError::Configuration(value.to_string())
    }
}

impl From<ConfigError> for AdminError {
    fn from(value: ConfigError) -> Self {
        AdminError::Configuration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_and_cross_tenant_read_the_same() {
        let immutable = AdminError::from(DomainError::immutable("role 'GestorMaster' is a system role"));
        let isolation = AdminError::from(StoreError::TenantIsolation("foreign tenant".into()));

        assert!(immutable.is_not_permitted());
        assert!(isolation.is_not_permitted());
        assert_eq!(immutable.public_message(), isolation.public_message());
        assert!(!immutable.public_message().contains("GestorMaster"));
    }

    #[test]
    fn duplicates_surface_as_validation_failures() {
        let err = AdminError::from(StoreError::Duplicate("role name 'HR' already exists".into()));
        assert!(matches!(err, AdminError::ValidationFailed(_)));
        assert!(!err.is_not_permitted());
    }

    #[test]
    fn storage_details_stay_internal() {
        let err = AdminError::from(StoreError::Storage("connection reset".into()));
        assert_eq!(err.public_message(), "internal error");
    }
}
