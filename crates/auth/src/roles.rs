use serde::{Deserialize, Serialize};

use hrgate_audit::{Auditable, FieldMap, field_map};
use hrgate_core::{
    DomainError, DomainResult, Entity, PermissionId, RoleId, TenantDraft, TenantId, TenantOwned,
};

/// A named bundle of permissions.
///
/// # Invariants
/// - `name` is unique within its tenant, or globally when `tenant_id` is `None`.
/// - A system role never changes: not its fields and not its permission set.
/// - `tenant_id == None` marks a global role visible to every tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub is_active: bool,
}

impl Role {
    /// Fails with `Immutable` for system roles. Must run before any write.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.is_system_role {
            return Err(DomainError::immutable(format!("role '{}' is a system role", self.name)));
        }
        Ok(())
    }

    /// Apply an update, returning the changed copy.
    pub fn updated(&self, update: &RoleUpdate) -> DomainResult<Role> {
        self.ensure_mutable()?;
        let mut next = self.clone();
        if let Some(name) = &update.name {
            next.name = normalize_name(name)?;
        }
        if let Some(description) = &update.description {
            next.description = description.clone();
        }
        if let Some(is_active) = update.is_active {
            next.is_active = is_active;
        }
        Ok(next)
    }
}

/// Creation payload for a role. `tenant_id` may be left unset; it is filled in
/// from the caller's tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub is_active: bool,
}

impl NewRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            name: name.into(),
            description: None,
            is_system_role: false,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system_role = true;
        self
    }

    pub fn validated(mut self) -> DomainResult<Self> {
        self.name = normalize_name(&self.name)?;
        Ok(self)
    }

    pub fn into_role(self, id: RoleId) -> Role {
        Role {
            id,
            tenant_id: self.tenant_id,
            name: self.name,
            description: self.description,
            is_system_role: self.is_system_role,
            is_active: self.is_active,
        }
    }
}

/// Partial update of a role's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

fn normalize_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("role name is empty"));
    }
    Ok(trimmed.to_string())
}

/// Grant of one permission to one role. Existence means "granted".
///
/// `tenant_id` is the owning role's tenant, carried so link audit records and
/// reads stay tenant-scoped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub tenant_id: Option<TenantId>,
}

impl Entity for Role {
    type Id = RoleId;
    type Draft = NewRole;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Role {
    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

impl TenantDraft for NewRole {
    fn requested_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn stamp_tenant(&mut self, tenant_id: Option<TenantId>) {
        self.tenant_id = tenant_id;
    }
}

impl TenantOwned for RolePermission {
    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

fn role_fields(
    tenant_id: Option<TenantId>,
    name: &str,
    description: &Option<String>,
    is_system_role: bool,
    is_active: bool,
) -> FieldMap {
    field_map! {
        "tenant_id" => tenant_id,
        "name" => name,
        "description" => description,
        "is_system_role" => is_system_role,
        "is_active" => is_active,
    }
}

impl Auditable for Role {
    const ENTITY_TYPE: &'static str = "Role";

    fn audit_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        role_fields(self.tenant_id, &self.name, &self.description, self.is_system_role, self.is_active)
    }
}

impl Auditable for NewRole {
    const ENTITY_TYPE: &'static str = Role::ENTITY_TYPE;

    fn audit_key(&self) -> Option<String> {
        None
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        role_fields(self.tenant_id, &self.name, &self.description, self.is_system_role, self.is_active)
    }
}

impl Auditable for RolePermission {
    const ENTITY_TYPE: &'static str = "RolePermission";

    fn audit_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.role_id, self.permission_id))
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        field_map! {
            "role_id" => self.role_id,
            "permission_id" => self.permission_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(is_system_role: bool) -> Role {
        NewRole {
            is_system_role,
            ..NewRole::new("Recursos Humanos")
        }
        .into_role(RoleId::new())
    }

    #[test]
    fn system_roles_reject_updates() {
        let err = role(true)
            .updated(&RoleUpdate {
                name: Some("renamed".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Immutable(_)));
    }

    #[test]
    fn update_applies_only_given_fields() {
        let before = role(false);
        let after = before
            .updated(&RoleUpdate {
                is_active: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(after.name, before.name);
        assert!(!after.is_active);
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(NewRole::new("   ").validated().is_err());
        assert_eq!(NewRole::new("  Gestor ").validated().unwrap().name, "Gestor");
    }

    #[test]
    fn link_audit_key_is_composite() {
        let link = RolePermission {
            role_id: RoleId::new(),
            permission_id: PermissionId::new(),
            tenant_id: None,
        };
        let key = link.audit_key().unwrap();
        assert_eq!(key, format!("{}:{}", link.role_id, link.permission_id));
        assert_eq!(link.audit_fields().len(), 2);
    }
}
