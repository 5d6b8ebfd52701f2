//! Append-only audit storage port and its in-memory implementation.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_core::{AuditRecordId, TenantId, TenantScope};

use crate::record::{AuditRecord, NewAuditRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditStoreError {
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),

    #[error("audit storage error: {0}")]
    Storage(String),
}

/// 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;

    /// Page numbers below 1 are treated as 1 and the size is kept at least 1.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Clamp the page size to an upper bound.
    pub fn capped(self, max_page_size: u32) -> Self {
        Self {
            page: self.page,
            page_size: self.page_size.min(max_page_size.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let size = u64::from(request.page_size);
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages: total.div_ceil(size),
        }
    }
}

/// Audit log filter.
///
/// `tenant_id` restricts results to one tenant's records; `None` means no tenant
/// restriction and is only produced for unrestricted scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub tenant_id: Option<TenantId>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl AuditQuery {
    /// Query visible to the given caller scope.
    pub fn for_scope(scope: &TenantScope) -> Self {
        Self {
            tenant_id: scope.tenant_id(),
            ..Default::default()
        }
    }

    pub fn entity_type(mut self, entity_type: Option<String>) -> Self {
        self.entity_type = entity_type;
        self
    }

    pub fn entity_id(mut self, entity_id: Option<String>) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(tenant_id) = self.tenant_id {
            if record.tenant_id != Some(tenant_id) {
                return false;
            }
        }
        if let Some(entity_type) = &self.entity_type {
            if &record.entity_type != entity_type {
                return false;
            }
        }
        if let Some(entity_id) = &self.entity_id {
            if &record.entity_id != entity_id {
                return false;
            }
        }
        true
    }
}

/// Append-only audit log.
///
/// Records are immutable once appended; there is no update or delete.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append records, assigning their ids.
    async fn append(&self, records: Vec<NewAuditRecord>) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Query records, newest first.
    async fn query(&self, query: &AuditQuery, page: PageRequest) -> Result<Page<AuditRecord>, AuditStoreError>;
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an audit storage outage.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, records: Vec<NewAuditRecord>) -> Result<Vec<AuditRecord>, AuditStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuditStoreError::Unavailable("writes disabled".to_string()));
        }

        let mut log = self
            .records
            .write()
            .map_err(|_| AuditStoreError::Storage("lock poisoned".to_string()))?;

        let written: Vec<AuditRecord> = records
            .into_iter()
            .map(|r| AuditRecord::from_new(AuditRecordId::new(), r))
            .collect();
        log.extend(written.iter().cloned());
        Ok(written)
    }

    async fn query(&self, query: &AuditQuery, page: PageRequest) -> Result<Page<AuditRecord>, AuditStoreError> {
        let log = self
            .records
            .read()
            .map_err(|_| AuditStoreError::Storage("lock poisoned".to_string()))?;

        let mut matching: Vec<&AuditRecord> = log.iter().filter(|r| query.matches(r)).collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditAction, FieldMap};
    use chrono::{Duration, Utc};

    fn record(tenant_id: Option<TenantId>, entity_type: &str, entity_id: &str, age_secs: i64) -> NewAuditRecord {
        NewAuditRecord {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: AuditAction::Created,
            old_values: FieldMap::new(),
            new_values: crate::field_map! { "name" => entity_id },
            actor_id: None,
            tenant_id,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn query_is_newest_first_and_paginated() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new();
        store
            .append(vec![
                record(Some(tenant), "Role", "r1", 30),
                record(Some(tenant), "Role", "r2", 10),
                record(Some(tenant), "Role", "r3", 20),
            ])
            .await
            .unwrap();

        let first = store
            .query(&AuditQuery::default(), PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.total_pages, 2);
        let ids: Vec<&str> = first.items.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);

        let second = store
            .query(&AuditQuery::default(), PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].entity_id, "r1");
    }

    #[tokio::test]
    async fn tenant_scoped_query_hides_other_and_tenantless_records() {
        let store = InMemoryAuditStore::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store
            .append(vec![
                record(Some(a), "Role", "mine", 0),
                record(Some(b), "Role", "theirs", 0),
                record(None, "Permission", "catalog", 0),
            ])
            .await
            .unwrap();

        let page = store
            .query(&AuditQuery::for_scope(&TenantScope::Tenant(a)), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].entity_id, "mine");

        let all = store
            .query(&AuditQuery::for_scope(&TenantScope::Master), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total, 3);
    }

    #[tokio::test]
    async fn filters_by_entity() {
        let store = InMemoryAuditStore::new();
        store
            .append(vec![record(None, "Role", "r1", 0), record(None, "RolePermission", "r1:p1", 0)])
            .await
            .unwrap();

        let query = AuditQuery::default().entity_type(Some("RolePermission".to_string()));
        let page = store.query(&query, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].entity_id, "r1:p1");
    }

    #[test]
    fn page_request_clamps() {
        let request = PageRequest::new(0, 500).capped(100);
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, 100);
        assert_eq!(request.offset(), 0);
    }
}
