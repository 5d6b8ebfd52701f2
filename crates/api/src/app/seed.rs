//! Default catalog and the `GestorMaster` system role.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument};

use hrgate_auth::{NewPermission, NewRole, PermissionCode, Role};
use hrgate_core::{PermissionId, SystemOperation};
use hrgate_infra::AcceptAll;

use super::PermissionAdmin;
use crate::{AdminError, RequestContext, authz};

pub const MASTER_ROLE_NAME: &str = "GestorMaster";

const DEFAULT_MODULES: &[&str] = &[
    "USERS",
    "ROLES",
    "EMPLOYEES",
    "ABSENCES",
    "EVALUATIONS",
    "DECLARATIONS",
];

const DEFAULT_ACTIONS: &[&str] = &["VIEW", "CREATE", "EDIT", "DELETE"];

const EXTRA_CODES: &[&str] = &[
    "ROLES_ASSIGN",
    "PERMISSIONS_VIEW",
    "PERMISSIONS_MANAGE",
    "ABSENCES_APPROVE",
    "EVALUATIONS_APPROVE",
    "DECLARATIONS_APPROVE",
    "AUDIT_VIEW",
    "AUDIT_EXPORT",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub permissions_existing: usize,
    pub master_role_created: bool,
    pub master_links_added: usize,
}

/// Every code the seed makes sure exists: the default module/action grid, the
/// extra codes and anything the loaded rules mention.
pub fn default_codes(rule_codes: &BTreeSet<PermissionCode>) -> BTreeSet<PermissionCode> {
    let grid = DEFAULT_MODULES.iter().flat_map(|module| {
        DEFAULT_ACTIONS
            .iter()
            .map(move |action| PermissionCode::new(format!("{module}_{action}")))
    });
    grid.chain(EXTRA_CODES.iter().map(|code| PermissionCode::new(*code)))
        .chain(rule_codes.iter().cloned())
        .collect()
}

impl PermissionAdmin {
    /// Idempotent provisioning. Only runs under the seeding system operation.
    ///
    /// The master role holds every permission, conflicting pairs included, so
    /// its links bypass the validation gate.
    #[instrument(skip_all)]
    pub async fn seed_defaults(&self, ctx: &RequestContext) -> Result<SeedReport, AdminError> {
        authz::require_system(ctx, SystemOperation::Seeding)?;
        let mut report = SeedReport::default();

        let catalog = self.catalog().await?;
        for code in default_codes(&self.engine.rules().known_codes()) {
            if catalog.by_code(&code).is_some() {
                report.permissions_existing += 1;
                continue;
            }
            self.create_permission(ctx, NewPermission::from_code(code)).await?;
            report.permissions_created += 1;
        }

        let role = match self.master_role(ctx).await? {
            Some(role) => role,
            None => {
                report.master_role_created = true;
                let draft = NewRole::new(MASTER_ROLE_NAME)
                    .with_description("Full access to every module")
                    .system();
                self.create_role(ctx, draft).await?
            }
        };

        let all: BTreeSet<PermissionId> = self.catalog().await?.ids();
        report.master_links_added = self.grant_links(ctx, &role, &all, &AcceptAll).await?.len();

        info!(
            permissions_created = report.permissions_created,
            permissions_existing = report.permissions_existing,
            master_role_created = report.master_role_created,
            master_links_added = report.master_links_added,
            "defaults seeded"
        );
        Ok(report)
    }

    async fn master_role(&self, ctx: &RequestContext) -> Result<Option<Role>, AdminError> {
        Ok(self
            .list_roles(ctx)
            .await?
            .into_iter()
            .find(|role| role.tenant_id.is_none() && role.name == MASTER_ROLE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codes_cover_the_grid_and_rule_codes() {
        let rule_codes: BTreeSet<PermissionCode> = [PermissionCode::new("PAYROLL_VIEW")].into_iter().collect();
        let codes = default_codes(&rule_codes);

        assert!(codes.contains(&PermissionCode::new("USERS_DELETE")));
        assert!(codes.contains(&PermissionCode::new("AUDIT_EXPORT")));
        assert!(codes.contains(&PermissionCode::new("PAYROLL_VIEW")));
        assert_eq!(
            codes.len(),
            DEFAULT_MODULES.len() * DEFAULT_ACTIONS.len() + EXTRA_CODES.len() + 1
        );
    }

    #[test]
    fn every_default_code_is_canonical() {
        for code in default_codes(&BTreeSet::new()) {
            assert_eq!(PermissionCode::parse(code.as_str()).unwrap(), code);
        }
    }
}
