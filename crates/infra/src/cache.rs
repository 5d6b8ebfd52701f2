//! Permission cache with eager invalidation.
//!
//! Fills are generation-guarded: a reader snapshots the invalidation epoch
//! before going to the store and the fill is dropped if any invalidation
//! happened in between. An entry known to be invalidated is never served.
//! The epoch is one counter for the whole cache, so bookkeeping does not grow
//! with the number of keys ever invalidated.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use hrgate_auth::{PermissionCatalog, PermissionCode};
use hrgate_core::{PermissionId, RoleId, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    RolePermissions(RoleId),
    UserPermissions(UserId),
    AllPermissions,
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CacheKey::RolePermissions(role_id) => write!(f, "hrgate:role_permissions:{role_id}"),
            CacheKey::UserPermissions(user_id) => write!(f, "hrgate:user_permissions:{user_id}"),
            CacheKey::AllPermissions => f.write_str("hrgate:all_permissions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    PermissionIds(BTreeSet<PermissionId>),
    PermissionCodes(BTreeSet<PermissionCode>),
    Catalog(Arc<PermissionCatalog>),
}

/// Invalidation epoch observed before a store read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheGeneration(u64);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub stale_fills_rejected: u64,
}

#[async_trait]
pub trait PermissionCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Epoch a fill of `key` must still match when it is stored.
    async fn generation(&self, key: &CacheKey) -> CacheGeneration;

    /// Store `value` unless `key` was invalidated after `observed` was taken.
    async fn put_if_current(&self, key: CacheKey, value: CachedValue, observed: CacheGeneration) -> bool;

    async fn invalidate(&self, keys: &[CacheKey]);

    /// Drop every entry.
    async fn invalidate_all(&self);

    fn stats(&self) -> CacheStats;
}

#[derive(Debug)]
struct Entry {
    value: CachedValue,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    epoch: u64,
}

/// Process-local cache.
#[derive(Debug)]
pub struct InMemoryPermissionCache {
    ttl: Duration,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    stale_fills_rejected: AtomicU64,
}

impl InMemoryPermissionCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            stale_fills_rejected: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryPermissionCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let hit = match self.state.read() {
            Ok(state) => state
                .entries
                .get(key)
                .filter(|entry| entry.expires_at > Instant::now())
                .map(|entry| entry.value.clone()),
            Err(_) => None,
        };

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    async fn generation(&self, _key: &CacheKey) -> CacheGeneration {
        // A poisoned lock refuses every fill, so the value does not matter.
        CacheGeneration(self.state.read().map(|state| state.epoch).unwrap_or(0))
    }

    async fn put_if_current(&self, key: CacheKey, value: CachedValue, observed: CacheGeneration) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };

        if state.epoch != observed.0 {
            self.stale_fills_rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "stale cache fill dropped");
            return false;
        }

        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        true
    }

    async fn invalidate(&self, keys: &[CacheKey]) {
        let Ok(mut state) = self.state.write() else {
            warn!("permission cache lock poisoned; invalidation skipped");
            return;
        };

        if keys.is_empty() {
            return;
        }
        for key in keys {
            state.entries.remove(key);
        }
        state.epoch += 1;
        self.invalidations.fetch_add(keys.len() as u64, Ordering::Relaxed);
        debug!(keys = keys.len(), "permission cache invalidated");
    }

    async fn invalidate_all(&self) {
        let Ok(mut state) = self.state.write() else {
            warn!("permission cache lock poisoned; invalidation skipped");
            return;
        };

        let dropped = state.entries.len();
        state.entries.clear();
        state.epoch += 1;
        self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
        warn!(entries = dropped, "permission cache flushed");
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            stale_fills_rejected: self.stale_fills_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> CachedValue {
        CachedValue::PermissionIds([PermissionId::new()].into_iter().collect())
    }

    #[test]
    fn keys_render_namespaced() {
        assert_eq!(CacheKey::AllPermissions.to_string(), "hrgate:all_permissions");
        let role = RoleId::new();
        assert_eq!(
            CacheKey::RolePermissions(role).to_string(),
            format!("hrgate:role_permissions:{role}")
        );
    }

    #[tokio::test]
    async fn fill_then_hit() {
        let cache = InMemoryPermissionCache::default();
        let key = CacheKey::RolePermissions(RoleId::new());

        assert_eq!(cache.get(&key).await, None);
        let generation = cache.generation(&key).await;
        assert!(cache.put_if_current(key, ids(), generation).await);
        assert!(cache.get(&key).await.is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn fill_racing_an_invalidation_is_dropped() {
        let cache = InMemoryPermissionCache::default();
        let key = CacheKey::UserPermissions(UserId::new());

        let observed = cache.generation(&key).await;
        cache.invalidate(&[key]).await;

        assert!(!cache.put_if_current(key, ids(), observed).await);
        assert_eq!(cache.get(&key).await, None);
        assert_eq!(cache.stats().stale_fills_rejected, 1);
    }

    #[tokio::test]
    async fn invalidation_removes_entries() {
        let cache = InMemoryPermissionCache::default();
        let key = CacheKey::AllPermissions;
        let generation = cache.generation(&key).await;
        cache.put_if_current(key, ids(), generation).await;

        cache.invalidate(&[key]).await;
        assert_eq!(cache.get(&key).await, None);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = InMemoryPermissionCache::new(Duration::ZERO);
        let key = CacheKey::AllPermissions;
        let generation = cache.generation(&key).await;
        cache.put_if_current(key, ids(), generation).await;

        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn unrelated_invalidation_also_drops_a_racing_fill() {
        let cache = InMemoryPermissionCache::default();
        let key = CacheKey::RolePermissions(RoleId::new());

        let observed = cache.generation(&key).await;
        cache.invalidate(&[CacheKey::UserPermissions(UserId::new())]).await;

        assert!(!cache.put_if_current(key, ids(), observed).await);
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn invalidating_many_keys_keeps_no_per_key_state() {
        let cache = InMemoryPermissionCache::default();
        for _ in 0..1_000 {
            cache.invalidate(&[CacheKey::UserPermissions(UserId::new())]).await;
        }

        let state = cache.state.read().unwrap();
        assert!(state.entries.is_empty());
        assert_eq!(state.epoch, 1_000);
    }

    #[tokio::test]
    async fn empty_invalidation_keeps_pending_fills() {
        let cache = InMemoryPermissionCache::default();
        let key = CacheKey::AllPermissions;

        let observed = cache.generation(&key).await;
        cache.invalidate(&[]).await;
        assert!(cache.put_if_current(key, ids(), observed).await);
    }

    #[tokio::test]
    async fn invalidate_all_drops_every_entry() {
        let cache = InMemoryPermissionCache::default();
        let role = CacheKey::RolePermissions(RoleId::new());
        let user = CacheKey::UserPermissions(UserId::new());
        for key in [role, user] {
            let generation = cache.generation(&key).await;
            cache.put_if_current(key, ids(), generation).await;
        }

        cache.invalidate_all().await;
        assert_eq!(cache.get(&role).await, None);
        assert_eq!(cache.get(&user).await, None);
        assert_eq!(cache.stats().invalidations, 2);
    }
}
