use std::collections::BTreeSet;

use tracing::instrument;

use hrgate_auth::{PermissionCatalog, PermissionCode};
use hrgate_core::{PermissionId, RoleId, UserId};
use hrgate_infra::Repository;
use hrgate_validation::{CompatibilityReport, RuleViolation, ValidationResult};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext};

pub const UNKNOWN_PERMISSION: &str = "UNKNOWN_PERMISSION";
pub const PERMISSION_INACTIVE: &str = "PERMISSION_INACTIVE";
pub const UNKNOWN_ROLE: &str = "UNKNOWN_ROLE";
pub const ROLE_INACTIVE: &str = "ROLE_INACTIVE";
pub const INVALID_CODE: &str = "INVALID_CODE";

impl PermissionAdmin {
    /// Validate `permission_ids` as the complete proposed set of a role.
    ///
    /// Unknown and inactive permissions are reported as findings. Only a role
    /// the caller cannot see is an error.
    #[instrument(skip_all, fields(scope = %ctx.scope(), role_id = %role_id))]
    pub async fn validate_role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<ValidationResult, AdminError> {
        self.load_role(ctx, role_id).await?;
        let catalog = self.catalog().await?;
        Ok(self.validate_ids(&catalog, permission_ids.iter()))
    }

    /// Validate the permission set a user would hold with exactly `role_ids`.
    #[instrument(skip_all, fields(scope = %ctx.scope(), user_id = %user_id))]
    pub async fn validate_user_permissions(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<ValidationResult, AdminError> {
        self.load_user(ctx, user_id).await?;
        let catalog = self.catalog().await?;

        let mut ids: BTreeSet<PermissionId> = BTreeSet::new();
        let mut findings = Vec::new();
        for role_id in role_ids.iter().collect::<BTreeSet<_>>() {
            let Some(role) = self.roles(ctx).get(role_id).await? else {
                findings.push(RuleViolation::error(UNKNOWN_ROLE, None, format!("role {role_id} does not exist")));
                continue;
            };
            if !role.is_active {
                findings.push(RuleViolation::error(
                    ROLE_INACTIVE,
                    None,
                    format!("role '{}' is inactive", role.name),
                ));
            }
            ids.extend(self.role_permission_ids(role.id).await?);
        }

        let mut result = self.validate_ids(&catalog, ids.iter());
        for finding in findings {
            result.push_violation(finding);
        }
        Ok(result)
    }

    /// Compatibility report for raw codes. Never fails: malformed codes are
    /// reported as findings.
    pub fn check_compatibility<I, S>(&self, codes: I) -> CompatibilityReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: BTreeSet<PermissionCode> = BTreeSet::new();
        let mut malformed = Vec::new();
        for raw in codes {
            match PermissionCode::parse(raw.as_ref()) {
                Ok(code) => {
                    parsed.insert(code);
                }
                Err(err) => malformed.push(RuleViolation::error(INVALID_CODE, None, err.to_string())),
            }
        }

        let mut result = self.engine.validate(&parsed);
        for violation in malformed {
            result.push_violation(violation);
        }
        result.into()
    }

    fn validate_ids<'a>(
        &self,
        catalog: &PermissionCatalog,
        ids: impl IntoIterator<Item = &'a PermissionId>,
    ) -> ValidationResult {
        let resolved = catalog.resolve(ids);
        let mut result = self.engine.validate(&resolved.codes);
        for id in resolved.unknown {
            result.push_violation(RuleViolation::error(
                UNKNOWN_PERMISSION,
                None,
                format!("permission {id} does not exist"),
            ));
        }
        for code in resolved.inactive {
            let message = format!("{code} is inactive and cannot be granted");
            result.push_violation(RuleViolation::error(PERMISSION_INACTIVE, Some(code), message));
        }
        result
    }
}
