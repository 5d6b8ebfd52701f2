use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, error};

use hrgate_auth::PermissionCode;

use crate::{
    CompatibilityReport, ConflictFinding, MissingDependency, RuleBook, RuleLoadError, RuleViolation, Severity,
    ValidationResult,
};

pub const DELETE_REQUIRES_VIEW: &str = "DELETE_REQUIRES_VIEW";

const CONFLICT_RESOLUTION: &str = "remove one of the two permissions";

/// Validates proposed permission sets against the loaded rules.
///
/// Dependency checking is depth-1 per supplied code: if A requires B and B
/// requires C, supplying {A, B} still reports C missing. The caller supplies
/// the closure.
#[derive(Debug, Clone)]
pub struct PermissionValidationEngine {
    rules: RuleBook,
}

impl PermissionValidationEngine {
    pub fn new(rules: RuleBook) -> Self {
        Self { rules }
    }

    /// Built-in rules, or the rule file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, RuleLoadError> {
        let rules = match path {
            Some(path) => RuleBook::from_path(path),
            None => RuleBook::builtin(),
        }
        .inspect_err(|e| error!(error = %e, "permission rule data failed to load"))?;

        debug!(
            version = %rules.version,
            dependencies = rules.dependencies.len(),
            conflicts = rules.conflicts.len(),
            "permission rules loaded"
        );
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn validate(&self, codes: &BTreeSet<PermissionCode>) -> ValidationResult {
        let missing = self.missing_dependencies(codes);
        let conflicts = self.conflicts(codes);
        let violations = business_rule_violations(codes);

        let result = ValidationResult::new(codes.len(), missing, conflicts, violations);
        debug!(
            total = result.total,
            missing = result.missing_dependencies.len(),
            conflicts = result.conflicts.len(),
            violations = result.violations.len(),
            is_valid = result.is_valid,
            "permission set validated"
        );
        result
    }

    pub fn validate_codes<I>(&self, codes: I) -> ValidationResult
    where
        I: IntoIterator<Item = PermissionCode>,
    {
        self.validate(&codes.into_iter().collect())
    }

    pub fn check_compatibility(&self, codes: &BTreeSet<PermissionCode>) -> CompatibilityReport {
        self.validate(codes).into()
    }

    fn missing_dependencies(&self, codes: &BTreeSet<PermissionCode>) -> Vec<MissingDependency> {
        let mut missing = Vec::new();
        for code in codes {
            for required in self.rules.dependencies.required_by(code) {
                if !codes.contains(required) {
                    missing.push(MissingDependency {
                        permission: code.clone(),
                        requires: required.clone(),
                        severity: Severity::Error,
                    });
                }
            }
        }
        missing
    }

    fn conflicts(&self, codes: &BTreeSet<PermissionCode>) -> Vec<ConflictFinding> {
        self.rules
            .conflicts
            .iter()
            .filter(|rule| codes.contains(&rule.first) && codes.contains(&rule.second))
            .map(|rule| ConflictFinding {
                first: rule.first.clone(),
                second: rule.second.clone(),
                kind: rule.kind,
                severity: rule.severity,
                description: rule.description.clone(),
                resolution: CONFLICT_RESOLUTION.to_string(),
            })
            .collect()
    }
}

fn business_rule_violations(codes: &BTreeSet<PermissionCode>) -> Vec<RuleViolation> {
    codes
        .iter()
        .filter_map(|code| {
            let view = code.view_counterpart()?;
            (!codes.contains(&view)).then(|| {
                RuleViolation::error(
                    DELETE_REQUIRES_VIEW,
                    Some(code.clone()),
                    format!("{code} requires {view}"),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConflictKind, ConflictRule};
    use proptest::prelude::*;

    fn code(c: &'static str) -> PermissionCode {
        PermissionCode::new(c)
    }

    fn set(codes: &[&'static str]) -> BTreeSet<PermissionCode> {
        codes.iter().map(|c| code(c)).collect()
    }

    fn engine() -> PermissionValidationEngine {
        PermissionValidationEngine::new(RuleBook::builtin().unwrap())
    }

    #[test]
    fn delete_with_view_is_valid() {
        let result = engine().validate(&set(&["USERS_VIEW", "USERS_DELETE"]));
        assert!(result.is_valid, "{}", result.summary());
        assert_eq!(result.severity, Severity::Info);
        assert_eq!(result.score(), 100);
    }

    #[test]
    fn delete_without_view_fails_dependency_and_business_rule() {
        let result = engine().validate(&set(&["USERS_DELETE"]));
        assert!(!result.is_valid);
        assert_eq!(
            result.missing_dependencies,
            vec![MissingDependency {
                permission: code("USERS_DELETE"),
                requires: code("USERS_VIEW"),
                severity: Severity::Error,
            }]
        );
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule, DELETE_REQUIRES_VIEW);
    }

    #[test]
    fn business_rule_applies_to_codes_without_dependency_rules() {
        let result = engine().validate(&set(&["REPORTS_DELETE"]));
        assert!(result.missing_dependencies.is_empty());
        assert_eq!(result.violations.len(), 1);
        assert!(!result.is_valid);
    }

    #[test]
    fn mutually_exclusive_pair_costs_twenty_points() {
        let result = engine().validate(&set(&["USERS_VIEW", "USERS_DELETE", "USERS_CREATE"]));
        assert!(!result.is_valid);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::MutuallyExclusive);
        assert_eq!(conflict.severity, Severity::Error);
        assert_eq!(conflict.resolution, CONFLICT_RESOLUTION);
        assert_eq!(result.score(), 80);
    }

    #[test]
    fn warning_conflict_keeps_set_valid() {
        let result = engine().validate(&set(&[
            "EMPLOYEES_VIEW",
            "ABSENCES_VIEW",
            "ABSENCES_CREATE",
            "ABSENCES_APPROVE",
        ]));
        assert!(result.is_valid, "{}", result.summary());
        assert_eq!(result.severity, Severity::Warning);
        assert_eq!(result.score(), 95);
    }

    #[test]
    fn dependencies_are_not_transitively_closed() {
        let rules = RuleBook::default()
            .with_dependency(code("A_RUN"), vec![code("B_RUN")])
            .with_dependency(code("B_RUN"), vec![code("C_RUN")]);
        let result = PermissionValidationEngine::new(rules).validate(&set(&["A_RUN", "B_RUN"]));

        assert_eq!(result.missing_dependencies.len(), 1);
        assert_eq!(result.missing_dependencies[0].permission, code("B_RUN"));
        assert_eq!(result.missing_dependencies[0].requires, code("C_RUN"));
    }

    #[test]
    fn empty_set_is_valid_but_scores_zero() {
        let report = engine().check_compatibility(&BTreeSet::new());
        assert!(report.is_compatible);
        assert_eq!(report.metrics.total, 0);
        assert_eq!(report.metrics.score, 0);
    }

    #[test]
    fn compatibility_report_counts_findings() {
        let report = engine().check_compatibility(&set(&["USERS_DELETE", "USERS_CREATE"]));
        assert!(!report.is_compatible);
        assert_eq!(report.severity, Severity::Error);
        assert_eq!(report.metrics.total, 2);
        assert_eq!(report.metrics.missing_count, 2);
        assert_eq!(report.metrics.conflict_count, 1);
        // two missing USERS_VIEW, one conflict, one business rule
        assert_eq!(report.metrics.error_count, 4);
        assert_eq!(report.metrics.warning_count, 0);
        assert_eq!(report.metrics.score, 60);
    }

    #[test]
    fn load_falls_back_to_builtin_rules() {
        let engine = PermissionValidationEngine::load(None).unwrap();
        assert_eq!(engine.rules(), &RuleBook::builtin().unwrap());
        assert!(PermissionValidationEngine::load(Some(Path::new("/nonexistent/rules.json"))).is_err());
    }

    const UNIVERSE: &[&str] = &[
        "USERS_VIEW",
        "USERS_CREATE",
        "USERS_EDIT",
        "USERS_DELETE",
        "ROLES_VIEW",
        "ROLES_ASSIGN",
        "ABSENCES_VIEW",
        "ABSENCES_CREATE",
        "ABSENCES_APPROVE",
        "EMPLOYEES_VIEW",
        "DECLARATIONS_APPROVE",
        "DECLARATIONS_DELETE",
        "REPORTS_DELETE",
    ];

    fn subset() -> impl Strategy<Value = Vec<&'static str>> {
        proptest::sample::subsequence(UNIVERSE, 0..=UNIVERSE.len())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn conflicts_do_not_depend_on_input_order(codes in subset(), seed in any::<u64>()) {
            let engine = engine();
            let forward: Vec<_> = codes.iter().map(|c| code(c)).collect();
            let mut shuffled = forward.clone();
            let len = shuffled.len().max(1);
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            prop_assert_eq!(
                engine.validate_codes(forward).conflicts,
                engine.validate_codes(shuffled).conflicts
            );
        }

        #[test]
        fn reversed_rule_declaration_detects_the_same_pair(first in 0usize..4, second in 0usize..4) {
            prop_assume!(first != second);
            let (a, b) = (code(UNIVERSE[first]), code(UNIVERSE[second]));
            let forward = RuleBook::default().with_conflict(ConflictRule::new(
                a.clone(), b.clone(), ConflictKind::MutuallyExclusive, Severity::Error, "x",
            ));
            let backward = RuleBook::default().with_conflict(ConflictRule::new(
                b.clone(), a.clone(), ConflictKind::MutuallyExclusive, Severity::Error, "x",
            ));
            let input: BTreeSet<_> = [a, b].into_iter().collect();

            prop_assert_eq!(
                PermissionValidationEngine::new(forward).validate(&input).conflicts,
                PermissionValidationEngine::new(backward).validate(&input).conflicts
            );
        }

        #[test]
        fn valid_iff_no_error_finding(codes in subset()) {
            let engine = engine();
            let input: BTreeSet<_> = codes.iter().map(|c| code(c)).collect();
            let rules = engine.rules();

            let unmet = input.iter().any(|c| {
                rules.dependencies.required_by(c).iter().any(|r| !input.contains(r))
            });
            let error_conflict = rules.conflicts.iter().any(|r| {
                r.severity == Severity::Error && input.contains(&r.first) && input.contains(&r.second)
            });
            let delete_without_view = input
                .iter()
                .filter_map(PermissionCode::view_counterpart)
                .any(|view| !input.contains(&view));

            prop_assert_eq!(
                engine.validate(&input).is_valid,
                !(unmet || error_conflict || delete_without_view)
            );
        }
    }
}
