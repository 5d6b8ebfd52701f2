//! Two-phase audit capture.
//!
//! 1. Before the business write, stage one entry per tracked instance
//!    (`added` / `modified` / `deleted`), snapshotting the pre-write state.
//! 2. After the write commits, backfill store-generated ids into the entries
//!    staged for newly added records.
//! 3. Persist the records. Persistence is best effort: a failure is logged
//!    loudly and never undoes or fails the business mutation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error};

use hrgate_core::{TenantId, UserId};

use crate::diff::{Auditable, diff_fields};
use crate::record::{AuditAction, AuditRecord, FieldMap, NewAuditRecord};
use crate::store::AuditStore;

/// Handle to a staged entry, used to backfill its entity id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StagedAudit(usize);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("staged {entity_type} entry #{index} was never given its generated id")]
    UnresolvedKey { index: usize, entity_type: String },

    #[error("unknown staged entry #{0}")]
    UnknownEntry(usize),
}

#[derive(Debug, Clone)]
struct PendingEntry {
    entity_type: &'static str,
    entity_id: Option<String>,
    action: AuditAction,
    old_values: FieldMap,
    new_values: FieldMap,
    tenant_id: Option<TenantId>,
    staged_at: DateTime<Utc>,
}

/// In-memory staging area for the audit records of one logical operation.
#[derive(Debug, Clone)]
pub struct AuditCapture {
    actor_id: Option<UserId>,
    entries: Vec<PendingEntry>,
}

impl AuditCapture {
    pub fn new(actor_id: Option<UserId>) -> Self {
        Self {
            actor_id,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stage a `Created` entry. The key may still be unknown at this point.
    pub fn added<E: Auditable>(&mut self, entity: &E) -> Option<StagedAudit> {
        let fields = entity.audit_fields();
        self.push::<E>(entity.audit_key(), AuditAction::Created, FieldMap::new(), fields, entity.audit_tenant())
    }

    /// Stage an `Updated` entry holding only the changed fields.
    ///
    /// Returns `None` when nothing changed; no record is written for a no-op.
    pub fn modified<E: Auditable>(&mut self, before: &E, after: &E) -> Option<StagedAudit> {
        let (old_values, new_values) = diff_fields(&before.audit_fields(), &after.audit_fields());
        if new_values.is_empty() {
            return None;
        }
        let key = after.audit_key().or_else(|| before.audit_key());
        self.push::<E>(key, AuditAction::Updated, old_values, new_values, after.audit_tenant())
    }

    /// Stage a `Deleted` entry carrying the last known field values.
    pub fn deleted<E: Auditable>(&mut self, entity: &E) -> Option<StagedAudit> {
        let fields = entity.audit_fields();
        self.push::<E>(entity.audit_key(), AuditAction::Deleted, fields, FieldMap::new(), entity.audit_tenant())
    }

    /// Patch the store-generated id into a staged entry (post-commit phase).
    pub fn backfill_key(&mut self, staged: StagedAudit, key: impl ToString) -> Result<(), CaptureError> {
        let entry = self
            .entries
            .get_mut(staged.0)
            .ok_or(CaptureError::UnknownEntry(staged.0))?;
        entry.entity_id = Some(key.to_string());
        Ok(())
    }

    /// Finalize the staged entries. Every entry must have its key by now.
    pub fn into_records(self) -> Result<Vec<NewAuditRecord>, CaptureError> {
        let actor_id = self.actor_id;
        self.entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let entity_id = entry.entity_id.ok_or_else(|| CaptureError::UnresolvedKey {
                    index,
                    entity_type: entry.entity_type.to_string(),
                })?;
                Ok(NewAuditRecord {
                    entity_type: entry.entity_type.to_string(),
                    entity_id,
                    action: entry.action,
                    old_values: entry.old_values,
                    new_values: entry.new_values,
                    actor_id,
                    tenant_id: entry.tenant_id,
                    timestamp: entry.staged_at,
                })
            })
            .collect()
    }

    /// Persist the staged records, best effort.
    ///
    /// Returns the number of records written. Failures are logged at error level
    /// and swallowed: the business data is authoritative, the audit trail is not.
    pub async fn persist<S>(self, store: &S) -> usize
    where
        S: AuditStore + ?Sized,
    {
        if self.entries.is_empty() {
            return 0;
        }

        let entity_types: BTreeSet<&'static str> = self.entries.iter().map(|e| e.entity_type).collect();
        let staged = self.entries.len();

        let records = match self.into_records() {
            Ok(records) => records,
            Err(err) => {
                error!(
                    lost_records = staged,
                    entity_types = ?entity_types,
                    error = %err,
                    "audit capture incomplete; business mutation committed without audit trail"
                );
                return 0;
            }
        };

        match store.append(records).await {
            Ok(written) => {
                debug!(written = written.len(), "audit records persisted");
                written.len()
            }
            Err(err) => {
                error!(
                    lost_records = staged,
                    entity_types = ?entity_types,
                    error = %err,
                    "audit write failed; business mutation committed without audit trail"
                );
                0
            }
        }
    }

    fn push<E: Auditable>(
        &mut self,
        entity_id: Option<String>,
        action: AuditAction,
        old_values: FieldMap,
        new_values: FieldMap,
        tenant_id: Option<TenantId>,
    ) -> Option<StagedAudit> {
        // Audit records are never themselves audited.
        if E::ENTITY_TYPE == AuditRecord::ENTITY_TYPE {
            return None;
        }

        self.entries.push(PendingEntry {
            entity_type: E::ENTITY_TYPE,
            entity_id,
            action,
            old_values,
            new_values,
            tenant_id,
            staged_at: Utc::now(),
        });
        Some(StagedAudit(self.entries.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAuditStore;
    use crate::{AuditQuery, PageRequest};
    use serde_json::json;

    #[derive(Clone)]
    struct Widget {
        id: Option<u32>,
        name: String,
        enabled: bool,
    }

    impl Auditable for Widget {
        const ENTITY_TYPE: &'static str = "Widget";

        fn audit_key(&self) -> Option<String> {
            self.id.map(|id| id.to_string())
        }

        fn audit_tenant(&self) -> Option<TenantId> {
            None
        }

        fn audit_fields(&self) -> FieldMap {
            crate::field_map! { "name" => self.name, "enabled" => self.enabled }
        }
    }

    struct Recursive;

    impl Auditable for Recursive {
        const ENTITY_TYPE: &'static str = AuditRecord::ENTITY_TYPE;

        fn audit_key(&self) -> Option<String> {
            Some("x".into())
        }

        fn audit_tenant(&self) -> Option<TenantId> {
            None
        }

        fn audit_fields(&self) -> FieldMap {
            FieldMap::new()
        }
    }

    fn widget(id: Option<u32>, name: &str, enabled: bool) -> Widget {
        Widget {
            id,
            name: name.to_string(),
            enabled,
        }
    }

    #[test]
    fn created_has_only_new_values_and_deleted_only_old() {
        let mut capture = AuditCapture::new(None);
        capture.added(&widget(Some(1), "a", true));
        capture.deleted(&widget(Some(2), "b", false));

        let records = capture.into_records().unwrap();
        assert_eq!(records[0].action, AuditAction::Created);
        assert!(records[0].old_values.is_empty());
        assert_eq!(records[0].new_values.len(), 2);

        assert_eq!(records[1].action, AuditAction::Deleted);
        assert!(records[1].new_values.is_empty());
        assert_eq!(records[1].old_values["name"], json!("b"));
    }

    #[test]
    fn modification_without_changes_stages_nothing() {
        let mut capture = AuditCapture::new(None);
        let w = widget(Some(1), "a", true);
        assert!(capture.modified(&w, &w.clone()).is_none());
        assert!(capture.is_empty());
    }

    #[test]
    fn generated_id_must_be_backfilled() {
        let mut capture = AuditCapture::new(None);
        let staged = capture.added(&widget(None, "draft", true)).unwrap();

        let unresolved = capture.clone().into_records().unwrap_err();
        assert!(matches!(unresolved, CaptureError::UnresolvedKey { index: 0, .. }));

        capture.backfill_key(staged, 42).unwrap();
        let records = capture.into_records().unwrap();
        assert_eq!(records[0].entity_id, "42");
    }

    #[test]
    fn audit_records_are_never_captured() {
        let mut capture = AuditCapture::new(None);
        assert!(capture.added(&Recursive).is_none());
        assert!(capture.is_empty());
    }

    #[tokio::test]
    async fn persist_writes_every_staged_record() {
        let store = InMemoryAuditStore::new();
        let mut capture = AuditCapture::new(Some(UserId::new()));
        capture.added(&widget(Some(1), "a", true));
        capture.modified(&widget(Some(1), "a", true), &widget(Some(1), "a", false));

        assert_eq!(capture.persist(&store).await, 2);

        let page = store
            .query(&AuditQuery::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn persist_swallows_store_failures() {
        let store = InMemoryAuditStore::new();
        store.fail_writes(true);

        let mut capture = AuditCapture::new(None);
        capture.added(&widget(Some(1), "a", true));

        assert_eq!(capture.persist(&store).await, 0);
    }
}
