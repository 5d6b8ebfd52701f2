//! Static dependency and conflict rules.
//!
//! Rules are compiled into the engine at start-up from a JSON document: the
//! built-in one embedded in the binary, or an override file. Rule data that does
//! not load or is inconsistent is a fatal configuration error; the engine never
//! runs on partial rules.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_auth::PermissionCode;
use hrgate_core::DomainError;

use crate::Severity;

const BUILTIN_RULES: &str = include_str!("../rules/default_rules.json");

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("inconsistent rule data: {0}")]
    Inconsistent(String),
}

impl From<RuleLoadError> for DomainError {
    fn from(value: RuleLoadError) -> Self {
        DomainError::configuration(value.to_string())
    }
}

/// Static mapping: permission code → codes it directly requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyRuleSet {
    requires: BTreeMap<PermissionCode, Vec<PermissionCode>>,
}

impl DependencyRuleSet {
    /// Direct requirements only. Requirements of requirements are not expanded.
    pub fn required_by(&self, code: &PermissionCode) -> &[PermissionCode] {
        self.requires.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.requires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requires.is_empty()
    }

    fn codes(&self) -> impl Iterator<Item = &PermissionCode> {
        self.requires
            .iter()
            .flat_map(|(code, required)| std::iter::once(code).chain(required.iter()))
    }
}

/// Kind of incompatibility a conflict rule describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    MutuallyExclusive,
    SegregationOfDuties,
}

impl core::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConflictKind::MutuallyExclusive => f.write_str("MUTUALLY_EXCLUSIVE"),
            ConflictKind::SegregationOfDuties => f.write_str("SEGREGATION_OF_DUTIES"),
        }
    }
}

/// Two codes that must never be granted together.
///
/// The pair is stored in canonical (sorted) order so detection does not depend
/// on how the rule or the input was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRule {
    pub first: PermissionCode,
    pub second: PermissionCode,
    pub kind: ConflictKind,
    pub severity: Severity,
    pub description: String,
}

impl ConflictRule {
    pub fn new(
        a: PermissionCode,
        b: PermissionCode,
        kind: ConflictKind,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first,
            second,
            kind,
            severity,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictRuleSet {
    rules: Vec<ConflictRule>,
}

impl ConflictRuleSet {
    pub fn iter(&self) -> impl Iterator<Item = &ConflictRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The complete, validated rule data the engine runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBook {
    pub version: String,
    pub dependencies: DependencyRuleSet,
    pub conflicts: ConflictRuleSet,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    conflicts: Vec<ConflictDocument>,
}

#[derive(Debug, Deserialize)]
struct ConflictDocument {
    first: String,
    second: String,
    #[serde(default = "default_kind")]
    kind: ConflictKind,
    severity: Severity,
    description: String,
}

fn default_kind() -> ConflictKind {
    ConflictKind::MutuallyExclusive
}

impl RuleBook {
    /// Rules shipped with the crate.
    pub fn builtin() -> Result<Self, RuleLoadError> {
        Self::from_json(BUILTIN_RULES)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RuleLoadError> {
        let document: RuleDocument = serde_json::from_str(raw)?;

        let mut requires = BTreeMap::new();
        for (code, required) in document.dependencies {
            let code = strict_code(&code)?;
            let mut list = Vec::with_capacity(required.len());
            for r in required {
                let r = strict_code(&r)?;
                if r == code {
                    return Err(RuleLoadError::Inconsistent(format!("{code} requires itself")));
                }
                if !list.contains(&r) {
                    list.push(r);
                }
            }
            requires.insert(code, list);
        }

        let mut rules = Vec::with_capacity(document.conflicts.len());
        let mut seen = BTreeSet::new();
        for c in document.conflicts {
            let rule = ConflictRule::new(
                strict_code(&c.first)?,
                strict_code(&c.second)?,
                c.kind,
                c.severity,
                c.description,
            );
            if rule.first == rule.second {
                return Err(RuleLoadError::Inconsistent(format!("{} conflicts with itself", rule.first)));
            }
            if rule.severity == Severity::Info {
                return Err(RuleLoadError::Inconsistent(format!(
                    "conflict {} / {} must be ERROR or WARNING",
                    rule.first, rule.second
                )));
            }
            if !seen.insert((rule.first.clone(), rule.second.clone())) {
                return Err(RuleLoadError::Inconsistent(format!(
                    "conflict {} / {} declared twice",
                    rule.first, rule.second
                )));
            }
            rules.push(rule);
        }

        Ok(Self {
            version: document.version.unwrap_or_else(|| "1.0".to_string()),
            dependencies: DependencyRuleSet { requires },
            conflicts: ConflictRuleSet { rules },
        })
    }

    pub fn with_dependency(mut self, code: PermissionCode, required: Vec<PermissionCode>) -> Self {
        self.dependencies.requires.insert(code, required);
        self
    }

    pub fn with_conflict(mut self, rule: ConflictRule) -> Self {
        self.conflicts.rules.push(rule);
        self
    }

    /// Every code mentioned anywhere in the rules.
    pub fn known_codes(&self) -> BTreeSet<PermissionCode> {
        self.dependencies
            .codes()
            .chain(self.conflicts.iter().flat_map(|r| [&r.first, &r.second]))
            .cloned()
            .collect()
    }
}

/// Rule files must already be in canonical form.
fn strict_code(raw: &str) -> Result<PermissionCode, RuleLoadError> {
    let code = PermissionCode::parse(raw).map_err(|e| RuleLoadError::Inconsistent(e.to_string()))?;
    if code.as_str() != raw {
        return Err(RuleLoadError::Inconsistent(format!(
            "permission code '{raw}' is not canonical (expected '{code}')"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_load() {
        let book = RuleBook::builtin().unwrap();
        assert!(!book.dependencies.is_empty());
        assert!(!book.conflicts.is_empty());
        assert_eq!(
            book.dependencies.required_by(&PermissionCode::new("USERS_DELETE")),
            &[PermissionCode::new("USERS_VIEW")]
        );
        assert!(book.known_codes().contains(&PermissionCode::new("DECLARATIONS_DELETE")));
    }

    #[test]
    fn conflict_pairs_are_canonical() {
        let rule = ConflictRule::new(
            PermissionCode::new("USERS_DELETE"),
            PermissionCode::new("USERS_CREATE"),
            ConflictKind::MutuallyExclusive,
            Severity::Error,
            "x",
        );
        assert_eq!(rule.first.as_str(), "USERS_CREATE");
        assert_eq!(rule.second.as_str(), "USERS_DELETE");
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(RuleBook::from_json("{ not json"), Err(RuleLoadError::Parse(_))));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let raw = r#"{ "dependencies": { "USERS_VIEW": ["USERS_VIEW"] } }"#;
        assert!(matches!(RuleBook::from_json(raw), Err(RuleLoadError::Inconsistent(_))));
    }

    #[test]
    fn duplicate_conflict_in_either_order_is_rejected() {
        let raw = r#"{ "conflicts": [
            { "first": "A_X", "second": "B_X", "severity": "ERROR", "description": "d" },
            { "first": "B_X", "second": "A_X", "severity": "WARNING", "description": "d" }
        ] }"#;
        assert!(matches!(RuleBook::from_json(raw), Err(RuleLoadError::Inconsistent(_))));
    }

    #[test]
    fn non_canonical_codes_are_rejected() {
        let raw = r#"{ "dependencies": { "users_view": [] } }"#;
        assert!(matches!(RuleBook::from_json(raw), Err(RuleLoadError::Inconsistent(_))));
    }

    #[test]
    fn missing_rule_file_maps_to_configuration_error() {
        let err = RuleBook::from_path("/nonexistent/hrgate-rules.json").unwrap_err();
        assert!(matches!(err, RuleLoadError::Io { .. }));
        let domain: DomainError = err.into();
        assert!(matches!(domain, DomainError::Configuration(_)));
    }
}
