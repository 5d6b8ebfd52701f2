//! Application facade: every access-control operation the enclosing HR system
//! calls, wired over the stores, the audit log, the cache and the rule engine.
//!
//! Layout:
//! - `validation.rs`: validate role/user permission sets, compatibility reports
//! - `assignment.rs`: grant, revoke and replace role permissions
//! - `roles.rs`, `catalog.rs`, `users.rs`: record lifecycle
//! - `effective.rs`: cached effective-permission reads
//! - `audit_log.rs`: paginated audit queries
//! - `templates.rs`: role template export/import
//! - `seed.rs`: default catalog and system role

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use hrgate_audit::{AuditStore, InMemoryAuditStore};
use hrgate_auth::{PermissionCatalog, Role, User};
use hrgate_core::{PermissionId, RoleId, UserId};
use hrgate_infra::{
    AccessStores, CacheKey, CacheStats, CachedValue, InMemoryPermissionCache, PermissionCache, PermissionSetGuard,
    PostgresAccessStore, PostgresAuditStore, Repository, StoreError, TenantFiltered,
};
use hrgate_validation::PermissionValidationEngine;

use crate::{AdminError, HrGateConfig, RequestContext};

mod assignment;
mod audit_log;
mod catalog;
mod effective;
pub mod errors;
mod roles;
pub mod seed;
pub mod templates;
mod users;
mod validation;

/// Behaviour switches taken from configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AdminSettings {
    /// Reject role permission writes whose resulting set fails validation.
    pub enforce_validation: bool,
    pub audit_max_page_size: u32,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enforce_validation: true,
            audit_max_page_size: crate::config::DEFAULT_AUDIT_MAX_PAGE_SIZE,
        }
    }
}

pub struct PermissionAdmin {
    stores: AccessStores,
    audit: Arc<dyn AuditStore>,
    cache: Arc<dyn PermissionCache>,
    engine: Arc<PermissionValidationEngine>,
    settings: AdminSettings,
}

impl PermissionAdmin {
    pub fn new(
        stores: AccessStores,
        audit: Arc<dyn AuditStore>,
        cache: Arc<dyn PermissionCache>,
        engine: Arc<PermissionValidationEngine>,
        settings: AdminSettings,
    ) -> Self {
        Self {
            stores,
            audit,
            cache,
            engine,
            settings,
        }
    }

    /// In-memory stores, built-in rules and default settings.
    pub fn in_memory() -> Result<Self, AdminError> {
        Ok(Self::new(
            AccessStores::in_memory(),
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(InMemoryPermissionCache::default()),
            Arc::new(PermissionValidationEngine::load(None)?),
            AdminSettings::default(),
        ))
    }

    /// Wire everything from configuration. Rule data that fails to load is
    /// fatal.
    pub async fn bootstrap(config: &HrGateConfig) -> Result<Self, AdminError> {
        let engine = PermissionValidationEngine::load(config.rules_path.as_deref())?;
        let settings = AdminSettings {
            enforce_validation: config.enforce_validation,
            audit_max_page_size: config.audit_max_page_size,
        };
        let cache = Arc::new(InMemoryPermissionCache::new(config.cache_ttl));

        let (stores, audit): (AccessStores, Arc<dyn AuditStore>) = match &config.database_url {
            Some(url) => {
                let store = PostgresAccessStore::connect(url).await?;
                store.migrate().await?;
                let audit = Arc::new(PostgresAuditStore::new(store.pool().clone()));
                info!("using postgres access-control store");
                (AccessStores::postgres(store), audit)
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory stores");
                (AccessStores::in_memory(), Arc::new(InMemoryAuditStore::new()))
            }
        };

        if !settings.enforce_validation {
            warn!("permission set validation is advisory only; invalid sets will be stored");
        }

        Ok(Self::new(stores, audit, cache, Arc::new(engine), settings))
    }

    pub fn engine(&self) -> &PermissionValidationEngine {
        &self.engine
    }

    pub fn settings(&self) -> AdminSettings {
        self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn roles(&self, ctx: &RequestContext) -> TenantFiltered<Role> {
        TenantFiltered::new(self.stores.roles.clone(), ctx.scope())
    }

    fn users(&self, ctx: &RequestContext) -> TenantFiltered<User> {
        TenantFiltered::new(self.stores.users.clone(), ctx.scope())
    }

    /// Role visible to the caller. Foreign and missing roles both read as
    /// `NotFound`.
    async fn load_role(&self, ctx: &RequestContext, role_id: RoleId) -> Result<Role, AdminError> {
        self.roles(ctx).get(&role_id).await?.ok_or(AdminError::NotFound)
    }

    async fn load_user(&self, ctx: &RequestContext, user_id: UserId) -> Result<User, AdminError> {
        self.users(ctx).get(&user_id).await?.ok_or(AdminError::NotFound)
    }

    /// Every permission, served through the aggregate cache entry.
    async fn catalog(&self) -> Result<Arc<PermissionCatalog>, AdminError> {
        let key = CacheKey::AllPermissions;
        if let Some(CachedValue::Catalog(catalog)) = self.cache.get(&key).await {
            return Ok(catalog);
        }

        let observed = self.cache.generation(&key).await;
        let catalog = Arc::new(PermissionCatalog::new(self.stores.permissions.list().await?));
        self.cache
            .put_if_current(key, CachedValue::Catalog(catalog.clone()), observed)
            .await;
        Ok(catalog)
    }

    /// Permission ids linked to a role, served through the role cache entry.
    async fn role_permission_ids(&self, role_id: RoleId) -> Result<BTreeSet<PermissionId>, AdminError> {
        let key = CacheKey::RolePermissions(role_id);
        if let Some(CachedValue::PermissionIds(ids)) = self.cache.get(&key).await {
            return Ok(ids);
        }

        let observed = self.cache.generation(&key).await;
        let ids = self.stores.links.role_permissions(role_id).await?;
        self.cache
            .put_if_current(key, CachedValue::PermissionIds(ids.clone()), observed)
            .await;
        Ok(ids)
    }

    /// Drop the cache entries a change to these roles affects: the roles
    /// themselves, every holder (through the reverse index) and the aggregate.
    ///
    /// The role and aggregate keys go first. When the reverse index cannot be
    /// read the holders are unknown, so the whole cache is dropped before the
    /// error is returned.
    async fn invalidate_roles(&self, role_ids: &BTreeSet<RoleId>) -> Result<(), AdminError> {
        let mut keys = vec![CacheKey::AllPermissions];
        keys.extend(role_ids.iter().copied().map(CacheKey::RolePermissions));
        self.cache.invalidate(&keys).await;

        let mut holder_keys = Vec::new();
        for role_id in role_ids {
            match self.stores.links.users_with_role(*role_id).await {
                Ok(holders) => holder_keys.extend(holders.into_iter().map(CacheKey::UserPermissions)),
                Err(err) => {
                    error!(role_id = %role_id, error = %err, "role holders unknown; dropping every cached permission set");
                    self.cache.invalidate_all().await;
                    return Err(err.into());
                }
            }
        }
        self.cache.invalidate(&holder_keys).await;
        Ok(())
    }

    async fn invalidate_role(&self, role_id: RoleId) -> Result<(), AdminError> {
        self.invalidate_roles(&BTreeSet::from([role_id])).await
    }

    /// Guard run by the store against a role's resulting permission set.
    fn validation_guard<'a>(&'a self, catalog: &'a PermissionCatalog, role: &'a Role) -> impl PermissionSetGuard + 'a {
        move |resulting: &BTreeSet<PermissionId>| -> Result<(), StoreError> {
            let result = self.engine.validate(&catalog.codes_of(resulting, false));
            if result.is_valid {
                return Ok(());
            }
            if !self.settings.enforce_validation {
                warn!(role_id = %role.id, findings = %result.summary(), "storing invalid permission set");
                return Ok(());
            }
            warn!(role_id = %role.id, findings = %result.summary(), "permission set rejected by validation");
            Err(StoreError::Rejected(result.summary()))
        }
    }
}

impl core::fmt::Debug for PermissionAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionAdmin")
            .field("stores", &self.stores)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
