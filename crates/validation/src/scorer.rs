//! Compatibility scoring.

const START: i64 = 100;
const MISSING_DEPENDENCY_PENALTY: i64 = 10;
const ERROR_CONFLICT_PENALTY: i64 = 20;
const WARNING_CONFLICT_PENALTY: i64 = 5;

/// 0–100 summary of how clean a permission set is.
///
/// An empty set scores 0: there is nothing to validate.
pub fn compatibility_score(
    total: usize,
    missing_dependencies: usize,
    error_conflicts: usize,
    warning_conflicts: usize,
) -> u8 {
    if total == 0 {
        return 0;
    }

    let penalty = (missing_dependencies as i64)
        .saturating_mul(MISSING_DEPENDENCY_PENALTY)
        .saturating_add((error_conflicts as i64).saturating_mul(ERROR_CONFLICT_PENALTY))
        .saturating_add((warning_conflicts as i64).saturating_mul(WARNING_CONFLICT_PENALTY));

    START.saturating_sub(penalty).clamp(0, START) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clean_set_scores_full() {
        assert_eq!(compatibility_score(3, 0, 0, 0), 100);
    }

    #[test]
    fn penalties_apply_per_finding() {
        assert_eq!(compatibility_score(3, 1, 0, 0), 90);
        assert_eq!(compatibility_score(3, 0, 1, 0), 80);
        assert_eq!(compatibility_score(3, 0, 0, 1), 95);
        assert_eq!(compatibility_score(3, 2, 1, 2), 50);
    }

    #[test]
    fn score_floors_at_zero() {
        assert_eq!(compatibility_score(10, 20, 5, 0), 0);
    }

    #[test]
    fn empty_set_scores_zero() {
        assert_eq!(compatibility_score(0, 0, 0, 0), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn adding_a_finding_never_raises_the_score(
            total in 1usize..50,
            missing in 0usize..20,
            errors in 0usize..10,
            warnings in 0usize..10,
            which in 0u8..3,
        ) {
            let before = compatibility_score(total, missing, errors, warnings);
            let after = match which {
                0 => compatibility_score(total, missing + 1, errors, warnings),
                1 => compatibility_score(total, missing, errors + 1, warnings),
                _ => compatibility_score(total, missing, errors, warnings + 1),
            };
            prop_assert!(after <= before);
        }
    }
}
