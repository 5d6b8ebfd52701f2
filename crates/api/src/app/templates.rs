//! Role templates: portable JSON snapshots of roles and their permission codes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use hrgate_auth::{NewRole, PermissionCatalog, PermissionCode, Role, RoleUpdate};
use hrgate_core::{PermissionId, RoleId};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext, authz};

pub const TEMPLATE_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_role: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub permission_codes: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplateExport {
    pub export_date: DateTime<Utc>,
    pub version: String,
    pub total_roles: usize,
    pub roles: Vec<RoleTemplate>,
}

impl RoleTemplateExport {
    pub fn new(roles: Vec<RoleTemplate>) -> Self {
        Self {
            export_date: Utc::now(),
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            total_roles: roles.len(),
            roles,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStrategy {
    /// Add missing permissions to existing roles, keep extras.
    #[default]
    Merge,
    /// Existing roles end up with exactly the template's permissions.
    Replace,
    /// Overwrite existing roles' fields and permissions, only when allowed.
    Update,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub strategy: ImportStrategy,
    #[serde(default)]
    pub overwrite_existing: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleImportDetail {
    pub name: String,
    pub outcome: ImportOutcome,
    pub role_id: Option<RoleId>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<RoleImportDetail>,
    pub warnings: Vec<String>,
}

impl ImportResult {
    fn record(&mut self, name: &str, outcome: ImportOutcome, role_id: Option<RoleId>, message: Option<String>) {
        match outcome {
            ImportOutcome::Created => self.created += 1,
            ImportOutcome::Updated => self.updated += 1,
            ImportOutcome::Skipped => self.skipped += 1,
            ImportOutcome::Failed => self.failed += 1,
        }
        self.details.push(RoleImportDetail {
            name: name.to_string(),
            outcome,
            role_id,
            message,
        });
    }
}

impl PermissionAdmin {
    /// Export the given roles, or every role visible to the caller.
    #[instrument(skip_all, fields(scope = %ctx.scope()))]
    pub async fn export_roles(
        &self,
        ctx: &RequestContext,
        role_ids: Option<&[RoleId]>,
    ) -> Result<RoleTemplateExport, AdminError> {
        let roles = match role_ids {
            Some(ids) => {
                let mut roles = Vec::with_capacity(ids.len());
                for id in ids {
                    roles.push(self.load_role(ctx, *id).await?);
                }
                roles
            }
            None => self.list_roles(ctx).await?,
        };

        let catalog = self.catalog().await?;
        let mut templates = Vec::with_capacity(roles.len());
        for role in roles {
            let ids = self.role_permission_ids(role.id).await?;
            let codes = catalog.codes_of(&ids, false);
            templates.push(RoleTemplate {
                name: role.name.clone(),
                description: role.description.clone(),
                is_system_role: role.is_system_role,
                is_active: role.is_active,
                permission_codes: codes.iter().map(ToString::to_string).collect(),
                metadata: serde_json::json!({
                    "sourceRoleId": role.id,
                    "sourceTenantId": role.tenant_id,
                    "permissionCount": codes.len(),
                }),
            });
        }

        info!(roles = templates.len(), "roles exported");
        Ok(RoleTemplateExport::new(templates))
    }

    /// Import role templates into the caller's tenant.
    ///
    /// Per-role problems never abort the import; they are reported in the
    /// result. Existing system roles are never touched.
    #[instrument(skip_all, fields(scope = %ctx.scope(), strategy = ?options.strategy, roles = export.roles.len()))]
    pub async fn import_roles(
        &self,
        ctx: &RequestContext,
        export: &RoleTemplateExport,
        options: ImportOptions,
    ) -> Result<ImportResult, AdminError> {
        let target_tenant = ctx.scope().tenant_for_new(None)?;
        let mut result = ImportResult::default();

        for template in &export.roles {
            let catalog = self.catalog().await?;
            let ids = resolve_codes(&catalog, template, &mut result.warnings);

            let existing = self
                .list_roles(ctx)
                .await?
                .into_iter()
                .find(|role| role.tenant_id == target_tenant && role.name.eq_ignore_ascii_case(template.name.trim()));

            let outcome = match existing {
                Some(role) => self.import_into_existing(ctx, &catalog, role, template, &ids, options).await,
                None => self.import_new(ctx, &catalog, template, &ids).await,
            };

            match outcome {
                Ok((outcome, role_id, message)) => result.record(&template.name, outcome, role_id, message),
                Err(err) => {
                    warn!(role = %template.name, error = %err, "role template import failed");
                    result.record(&template.name, ImportOutcome::Failed, None, Some(err.public_message()));
                }
            }
        }

        info!(
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            warnings = result.warnings.len(),
            "role templates imported"
        );
        Ok(result)
    }

    async fn import_new(
        &self,
        ctx: &RequestContext,
        catalog: &PermissionCatalog,
        template: &RoleTemplate,
        ids: &BTreeSet<PermissionId>,
    ) -> Result<(ImportOutcome, Option<RoleId>, Option<String>), AdminError> {
        let validation = self.engine.validate(&catalog.codes_of(ids, false));
        if !validation.is_valid && self.settings.enforce_validation {
            return Ok((ImportOutcome::Failed, None, Some(validation.summary())));
        }

        let mut draft = NewRole::new(template.name.clone());
        draft.description = template.description.clone();
        draft.is_system_role = template.is_system_role;
        draft.is_active = template.is_active;
        let role = self.create_role(ctx, draft).await?;

        // Validated above; a freshly created system role only takes its
        // permissions here.
        let guard = self.validation_guard(catalog, &role);
        self.grant_links(ctx, &role, ids, &guard).await?;
        Ok((ImportOutcome::Created, Some(role.id), None))
    }

    async fn import_into_existing(
        &self,
        ctx: &RequestContext,
        catalog: &PermissionCatalog,
        role: Role,
        template: &RoleTemplate,
        ids: &BTreeSet<PermissionId>,
        options: ImportOptions,
    ) -> Result<(ImportOutcome, Option<RoleId>, Option<String>), AdminError> {
        if role.is_system_role {
            return Ok((
                ImportOutcome::Skipped,
                Some(role.id),
                Some("system roles are not modified by imports".to_string()),
            ));
        }
        authz::ensure_writable(ctx, &role)?;

        let guard = self.validation_guard(catalog, &role);
        let changed = match options.strategy {
            ImportStrategy::Merge => !self.grant_links(ctx, &role, ids, &guard).await?.is_empty(),
            ImportStrategy::Replace => !self.replace_links(ctx, &role, ids, &guard).await?.is_empty(),
            ImportStrategy::Update => {
                if !options.overwrite_existing {
                    return Ok((
                        ImportOutcome::Skipped,
                        Some(role.id),
                        Some("role exists and overwriting is not allowed".to_string()),
                    ));
                }
                // The role ends up with exactly `ids`; check it before any field changes.
                let validation = self.engine.validate(&catalog.codes_of(ids, false));
                if !validation.is_valid && self.settings.enforce_validation {
                    return Ok((ImportOutcome::Failed, Some(role.id), Some(validation.summary())));
                }
                let update = RoleUpdate {
                    name: None,
                    description: Some(template.description.clone()),
                    is_active: Some(template.is_active),
                };
                let updated = self.update_role(ctx, role.id, update).await?;
                let relinked = !self.replace_links(ctx, &updated, ids, &guard).await?.is_empty();
                relinked || updated != role
            }
        };

        if changed {
            Ok((ImportOutcome::Updated, Some(role.id), None))
        } else {
            Ok((ImportOutcome::Skipped, Some(role.id), Some("already up to date".to_string())))
        }
    }
}

/// Template codes known to the catalog and active. Everything else becomes a
/// warning.
fn resolve_codes(catalog: &PermissionCatalog, template: &RoleTemplate, warnings: &mut Vec<String>) -> BTreeSet<PermissionId> {
    let mut ids = BTreeSet::new();
    for raw in &template.permission_codes {
        let found = PermissionCode::parse(raw).ok().and_then(|code| catalog.by_code(&code));
        match found {
            Some(permission) if permission.is_active => {
                ids.insert(permission.id);
            }
            Some(permission) => warnings.push(format!(
                "role '{}': permission '{}' is inactive and was skipped",
                template.name, permission.code
            )),
            None => warnings.push(format!(
                "role '{}': permission code '{}' not found",
                template.name, raw
            )),
        }
    }
    ids
}
