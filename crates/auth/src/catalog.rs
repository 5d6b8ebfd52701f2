//! Snapshot of the known permission codes.

use std::collections::{BTreeMap, BTreeSet};

use hrgate_core::PermissionId;

use crate::{Permission, PermissionCode};

/// Immutable view over every permission, indexed by id and by code.
///
/// Built from the store and shared through the "all permissions" cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCatalog {
    by_id: BTreeMap<PermissionId, Permission>,
    by_code: BTreeMap<PermissionCode, PermissionId>,
}

/// Result of resolving permission ids against the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPermissions {
    pub codes: BTreeSet<PermissionCode>,
    pub unknown: Vec<PermissionId>,
    pub inactive: Vec<PermissionCode>,
}

impl PermissionCatalog {
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        let mut catalog = Self::default();
        for permission in permissions {
            catalog.by_code.insert(permission.code.clone(), permission.id);
            catalog.by_id.insert(permission.id, permission);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &PermissionId) -> Option<&Permission> {
        self.by_id.get(id)
    }

    pub fn by_code(&self, code: &PermissionCode) -> Option<&Permission> {
        self.by_code.get(code).and_then(|id| self.by_id.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.by_id.values()
    }

    pub fn ids(&self) -> BTreeSet<PermissionId> {
        self.by_id.keys().copied().collect()
    }

    /// Map ids to codes, reporting unknown ids and inactive permissions.
    pub fn resolve<'a>(&self, ids: impl IntoIterator<Item = &'a PermissionId>) -> ResolvedPermissions {
        let mut resolved = ResolvedPermissions::default();
        for id in ids {
            match self.by_id.get(id) {
                Some(permission) => {
                    if !permission.is_active {
                        resolved.inactive.push(permission.code.clone());
                    }
                    resolved.codes.insert(permission.code.clone());
                }
                None => resolved.unknown.push(*id),
            }
        }
        resolved
    }

    /// Codes of the given ids, skipping unknown ids and, optionally, inactive
    /// permissions.
    pub fn codes_of<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a PermissionId>,
        active_only: bool,
    ) -> BTreeSet<PermissionCode> {
        ids.into_iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|p| !active_only || p.is_active)
            .map(|p| p.code.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewPermission;

    fn permission(code: &'static str, is_active: bool) -> Permission {
        NewPermission {
            is_active,
            ..NewPermission::from_code(PermissionCode::new(code))
        }
        .into_permission(PermissionId::new())
    }

    #[test]
    fn resolve_reports_unknown_and_inactive() {
        let view = permission("USERS_VIEW", true);
        let old = permission("USERS_EXPORT", false);
        let catalog = PermissionCatalog::new(vec![view.clone(), old.clone()]);
        let missing = PermissionId::new();

        let resolved = catalog.resolve(&[view.id, old.id, missing]);

        assert_eq!(resolved.codes.len(), 2);
        assert_eq!(resolved.unknown, vec![missing]);
        assert_eq!(resolved.inactive, vec![PermissionCode::new("USERS_EXPORT")]);
    }

    #[test]
    fn codes_of_can_skip_inactive() {
        let view = permission("USERS_VIEW", true);
        let old = permission("USERS_EXPORT", false);
        let catalog = PermissionCatalog::new(vec![view.clone(), old.clone()]);

        assert_eq!(catalog.codes_of(&[view.id, old.id], true).len(), 1);
        assert_eq!(catalog.codes_of(&[view.id, old.id], false).len(), 2);
        assert_eq!(catalog.by_code(&PermissionCode::new("USERS_VIEW")), Some(&view));
    }
}
