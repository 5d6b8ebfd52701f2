//! Users as role holders.
//!
//! Profile data, credentials and lifecycle belong to the surrounding HR system;
//! this is the slice the access-control core needs.

use serde::{Deserialize, Serialize};

use hrgate_audit::{Auditable, FieldMap, field_map};
use hrgate_core::{DomainError, DomainResult, Entity, RoleId, TenantDraft, TenantId, TenantOwned, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub display_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub tenant_id: Option<TenantId>,
    pub display_name: String,
    pub is_active: bool,
}

impl NewUser {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            display_name: display_name.into(),
            is_active: true,
        }
    }

    pub fn validated(mut self) -> DomainResult<Self> {
        let trimmed = self.display_name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("display name is empty"));
        }
        self.display_name = trimmed.to_string();
        Ok(self)
    }

    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            tenant_id: self.tenant_id,
            display_name: self.display_name,
            is_active: self.is_active,
        }
    }
}

/// Grant of one role to one user. `tenant_id` is the user's tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub tenant_id: Option<TenantId>,
}

impl Entity for User {
    type Id = UserId;
    type Draft = NewUser;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for User {
    // Tenant-less users are platform operators, not shared records.
    const TENANTLESS_IS_SHARED: bool = false;

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

impl TenantDraft for NewUser {
    fn requested_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn stamp_tenant(&mut self, tenant_id: Option<TenantId>) {
        self.tenant_id = tenant_id;
    }
}

impl TenantOwned for UserRole {
    const TENANTLESS_IS_SHARED: bool = false;

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

fn user_fields(tenant_id: Option<TenantId>, display_name: &str, is_active: bool) -> FieldMap {
    field_map! {
        "tenant_id" => tenant_id,
        "display_name" => display_name,
        "is_active" => is_active,
    }
}

impl Auditable for User {
    const ENTITY_TYPE: &'static str = "User";

    fn audit_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        user_fields(self.tenant_id, &self.display_name, self.is_active)
    }
}

impl Auditable for NewUser {
    const ENTITY_TYPE: &'static str = User::ENTITY_TYPE;

    fn audit_key(&self) -> Option<String> {
        None
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        user_fields(self.tenant_id, &self.display_name, self.is_active)
    }
}

impl Auditable for UserRole {
    const ENTITY_TYPE: &'static str = "UserRole";

    fn audit_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.user_id, self.role_id))
    }

    fn audit_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn audit_fields(&self) -> FieldMap {
        field_map! {
            "user_id" => self.user_id,
            "role_id" => self.role_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_display_name_is_rejected() {
        assert!(NewUser::new("   ").validated().is_err());
        assert_eq!(NewUser::new(" Ana ").validated().unwrap().display_name, "Ana");
    }

    #[test]
    fn user_role_audit_key_names_both_sides() {
        let link = UserRole {
            user_id: UserId::new(),
            role_id: RoleId::new(),
            tenant_id: None,
        };
        assert_eq!(link.audit_key(), Some(format!("{}:{}", link.user_id, link.role_id)));
        assert_eq!(link.audit_fields().len(), 2);
    }
}
