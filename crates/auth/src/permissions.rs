use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use hrgate_audit::{Auditable, FieldMap, field_map};
use hrgate_core::{DomainError, DomainResult, Entity, PermissionId, TenantId};

/// Stable business key of a permission (e.g. `USERS_DELETE`).
///
/// Codes are `MODULE_ACTION` shaped: upper-case ASCII letters, digits and
/// underscores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(Cow<'static, str>);

impl PermissionCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    /// Parse user-supplied input, normalizing case and surrounding whitespace.
    pub fn parse(code: &str) -> DomainResult<Self> {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("permission code is empty"));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::validation(format!(
                "permission code '{normalized}' may only contain A-Z, 0-9 and '_'"
            )));
        }
        Ok(Self(Cow::Owned(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Module part: everything before the last `_`.
    pub fn module(&self) -> &str {
        self.as_str().rsplit_once('_').map(|(m, _)| m).unwrap_or(self.as_str())
    }

    /// Action part: everything after the last `_`.
    pub fn action(&self) -> &str {
        self.as_str().rsplit_once('_').map(|(_, a)| a).unwrap_or("")
    }

    /// For `X_DELETE`, the `X_VIEW` code it structurally requires.
    pub fn view_counterpart(&self) -> Option<PermissionCode> {
        self.as_str()
            .strip_suffix("_DELETE")
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| PermissionCode::new(format!("{prefix}_VIEW")))
    }
}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog entry. Soft-disabled through `is_active`, never hard-deleted once a
/// role references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub module: String,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Creation payload for a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub code: PermissionCode,
    pub module: String,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

impl NewPermission {
    /// Active permission with module/category/name derived from the code.
    pub fn from_code(code: PermissionCode) -> Self {
        let module = code.module().to_string();
        let category = code.action().to_string();
        let name = humanize(code.as_str());
        Self {
            code,
            module,
            category,
            name,
            description: None,
            is_active: true,
        }
    }

    pub fn into_permission(self, id: PermissionId) -> Permission {
        Permission {
            id,
            code: self.code,
            module: self.module,
            category: self.category,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
        }
    }
}

fn humanize(code: &str) -> String {
    code.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Entity for Permission {
    type Id = PermissionId;
    type Draft = NewPermission;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn permission_fields(
    code: &PermissionCode,
    module: &str,
    category: &str,
    name: &str,
    description: &Option<String>,
    is_active: bool,
) -> FieldMap {
    field_map! {
        "code" => code,
        "module" => module,
        "category" => category,
        "name" => name,
        "description" => description,
        "is_active" => is_active,
    }
}

impl Auditable for Permission {
    const ENTITY_TYPE: &'static str = "Permission";

    fn audit_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        None
    }

    fn audit_fields(&self) -> FieldMap {
        permission_fields(&self.code, &self.module, &self.category, &self.name, &self.description, self.is_active)
    }
}

impl Auditable for NewPermission {
    const ENTITY_TYPE: &'static str = Permission::ENTITY_TYPE;

    fn audit_key(&self) -> Option<String> {
        None
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        None
    }

    fn audit_fields(&self) -> FieldMap {
        permission_fields(&self.code, &self.module, &self.category, &self.name, &self.description, self.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_and_validates() {
        assert_eq!(PermissionCode::parse(" users_view ").unwrap().as_str(), "USERS_VIEW");
        assert!(PermissionCode::parse("").is_err());
        assert!(PermissionCode::parse("users.view").is_err());
    }

    #[test]
    fn delete_maps_to_view_counterpart() {
        let code = PermissionCode::new("EMPLOYEES_DELETE");
        assert_eq!(code.view_counterpart(), Some(PermissionCode::new("EMPLOYEES_VIEW")));
        assert_eq!(PermissionCode::new("EMPLOYEES_VIEW").view_counterpart(), None);
        assert_eq!(PermissionCode::new("_DELETE").view_counterpart(), None);
    }

    #[test]
    fn module_and_action_split_on_last_underscore() {
        let code = PermissionCode::new("ROLES_MANAGE_PERMISSIONS");
        assert_eq!(code.module(), "ROLES_MANAGE");
        assert_eq!(code.action(), "PERMISSIONS");
    }

    #[test]
    fn from_code_derives_descriptive_fields() {
        let draft = NewPermission::from_code(PermissionCode::new("ABSENCES_APPROVE"));
        assert_eq!(draft.module, "ABSENCES");
        assert_eq!(draft.category, "APPROVE");
        assert_eq!(draft.name, "Absences Approve");
        assert!(draft.is_active);
    }
}
