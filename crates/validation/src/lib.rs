//! `hrgate-validation` — permission-set consistency checking.
//!
//! Pure and deterministic: the engine evaluates a set of permission codes
//! against static dependency and conflict rules plus the structural
//! `_DELETE requires _VIEW` rule, and scores the result.

pub mod engine;
pub mod result;
pub mod rules;
pub mod scorer;

pub use engine::PermissionValidationEngine;
pub use result::{
    CompatibilityMetrics, CompatibilityReport, ConflictFinding, MissingDependency, RuleViolation, Severity,
    ValidationResult,
};
pub use rules::{ConflictKind, ConflictRule, ConflictRuleSet, DependencyRuleSet, RuleBook, RuleLoadError};
pub use scorer::compatibility_score;
