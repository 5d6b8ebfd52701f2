use serde::{Deserialize, Serialize};

use hrgate_auth::PermissionCode;

use crate::ConflictKind;
use crate::scorer::compatibility_score;

/// Finding severity. Ordered so that `max` yields the aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// `permission` is present but `requires` is not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissingDependency {
    pub permission: PermissionCode,
    pub requires: PermissionCode,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub first: PermissionCode,
    pub second: PermissionCode,
    pub kind: ConflictKind,
    pub severity: Severity,
    pub description: String,
    pub resolution: String,
}

/// A business-rule violation. Produced by the structural `_DELETE`/`_VIEW`
/// rule and by callers that reject input before it reaches the rules
/// (unknown or inactive permissions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule: String,
    pub permission: Option<PermissionCode>,
    pub message: String,
    pub severity: Severity,
}

impl RuleViolation {
    pub fn error(rule: impl Into<String>, permission: Option<PermissionCode>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            permission,
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Outcome of validating one permission set. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub severity: Severity,
    pub total: usize,
    pub missing_dependencies: Vec<MissingDependency>,
    pub conflicts: Vec<ConflictFinding>,
    pub violations: Vec<RuleViolation>,
}

impl ValidationResult {
    pub fn new(
        total: usize,
        missing_dependencies: Vec<MissingDependency>,
        conflicts: Vec<ConflictFinding>,
        violations: Vec<RuleViolation>,
    ) -> Self {
        let mut result = Self {
            is_valid: true,
            severity: Severity::Info,
            total,
            missing_dependencies,
            conflicts,
            violations,
        };
        result.recompute();
        result
    }

    pub fn push_violation(&mut self, violation: RuleViolation) {
        self.violations.push(violation);
        self.recompute();
    }

    fn severities(&self) -> impl Iterator<Item = Severity> + '_ {
        self.missing_dependencies
            .iter()
            .map(|m| m.severity)
            .chain(self.conflicts.iter().map(|c| c.severity))
            .chain(self.violations.iter().map(|v| v.severity))
    }

    fn recompute(&mut self) {
        self.severity = self.severities().max().unwrap_or(Severity::Info);
        self.is_valid = self.severity != Severity::Error;
    }

    pub fn error_count(&self) -> usize {
        self.severities().filter(|s| *s == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.severities().filter(|s| *s == Severity::Warning).count()
    }

    pub fn score(&self) -> u8 {
        let error_conflicts = self.conflicts.iter().filter(|c| c.severity == Severity::Error).count();
        let warning_conflicts = self.conflicts.iter().filter(|c| c.severity == Severity::Warning).count();
        compatibility_score(self.total, self.missing_dependencies.len(), error_conflicts, warning_conflicts)
    }

    /// One line per finding, for error messages and logs.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for m in &self.missing_dependencies {
            lines.push(format!("{} requires {}", m.permission, m.requires));
        }
        for c in &self.conflicts {
            lines.push(format!("{} conflicts with {} ({})", c.first, c.second, c.kind));
        }
        for v in &self.violations {
            lines.push(v.message.clone());
        }
        lines.join("; ")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityMetrics {
    pub total: usize,
    pub missing_count: usize,
    pub conflict_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub is_compatible: bool,
    pub severity: Severity,
    pub missing_dependencies: Vec<MissingDependency>,
    pub conflicts: Vec<ConflictFinding>,
    pub violations: Vec<RuleViolation>,
    pub metrics: CompatibilityMetrics,
}

impl From<ValidationResult> for CompatibilityReport {
    fn from(result: ValidationResult) -> Self {
        let metrics = CompatibilityMetrics {
            total: result.total,
            missing_count: result.missing_dependencies.len(),
            conflict_count: result.conflicts.len(),
            error_count: result.error_count(),
            warning_count: result.warning_count(),
            score: result.score(),
        };
        Self {
            is_compatible: result.is_valid,
            severity: result.severity,
            missing_dependencies: result.missing_dependencies,
            conflicts: result.conflicts,
            violations: result.violations,
            metrics,
        }
    }
}
