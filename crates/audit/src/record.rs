use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use hrgate_core::{AuditRecordId, TenantId, TenantOwned, UserId};

/// Field name → value snapshot. Ordered so payloads serialize deterministically.
pub type FieldMap = BTreeMap<String, JsonValue>;

/// Kind of mutation an audit record describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "Created",
            AuditAction::Updated => "Updated",
            AuditAction::Deleted => "Deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Created" => Some(AuditAction::Created),
            "Updated" => Some(AuditAction::Updated),
            "Deleted" => Some(AuditAction::Deleted),
            _ => None,
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record ready to be appended (not yet assigned a record id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub old_values: FieldMap,
    pub new_values: FieldMap,
    pub actor_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub timestamp: DateTime<Utc>,
}

/// Immutable, append-only audit log entry.
///
/// - `Created`: `old_values` empty, `new_values` holds every audited field.
/// - `Deleted`: the reverse.
/// - `Updated`: both maps hold only the fields whose value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub old_values: FieldMap,
    pub new_values: FieldMap,
    pub actor_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Entity type label of audit records themselves. Never captured.
    pub const ENTITY_TYPE: &'static str = "AuditRecord";

    pub fn from_new(id: AuditRecordId, record: NewAuditRecord) -> Self {
        Self {
            id,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            action: record.action,
            old_values: record.old_values,
            new_values: record.new_values,
            actor_id: record.actor_id,
            tenant_id: record.tenant_id,
            timestamp: record.timestamp,
        }
    }
}

impl TenantOwned for AuditRecord {
    // Records about shared catalog changes are operational data, not shared.
    const TENANTLESS_IS_SHARED: bool = false;

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}
