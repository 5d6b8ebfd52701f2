//! `hrgate-audit` — generic field-level audit trail for security-relevant records.
//!
//! Entities enumerate their audited fields once ([`Auditable`]); the capture
//! pipeline diffs before/after snapshots, stages records in memory, backfills
//! store-generated ids after the business write commits, and then persists the
//! records on a best-effort basis.

pub mod capture;
pub mod diff;
pub mod record;
pub mod store;

pub use capture::{AuditCapture, CaptureError, StagedAudit};
pub use diff::{Auditable, diff_fields, replay};
pub use record::{AuditAction, AuditRecord, FieldMap, NewAuditRecord};
pub use store::{AuditQuery, AuditStore, AuditStoreError, InMemoryAuditStore, Page, PageRequest};
