//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Structural failures only: these are raised as typed errors. Permission-set
/// findings (missing dependencies, conflicts) are never raised; they travel in a
/// validation result instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The referenced record does not exist, or does not exist within the
    /// caller's tenant. The two cases are deliberately indistinguishable.
    #[error("not found")]
    NotFound,

    /// Attempted mutation of an immutable record (system roles).
    #[error("immutable: {0}")]
    Immutable(String),

    /// Business-rule or uniqueness violation on create/update.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Cross-tenant access or missing tenant context.
    #[error("unauthorized")]
    Unauthorized,

    /// Concurrent modification detected.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rule data or other required configuration could not be loaded.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    pub fn immutable(msg: impl Into<String>) -> Self {
        Self::Immutable(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Whether this error must read as "not permitted" to the end user.
    ///
    /// Blocked system-role mutations and cross-tenant attempts share one
    /// user-visible shape so tenant topology does not leak.
    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::Immutable(_) | Self::Unauthorized)
    }
}
