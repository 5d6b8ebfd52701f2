//! Append-only audit log over Postgres.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use hrgate_audit::{
    AuditAction, AuditQuery, AuditRecord, AuditStore, AuditStoreError, FieldMap, NewAuditRecord, Page, PageRequest,
};
use hrgate_core::{AuditRecordId, TenantId, UserId};

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn map_audit_error(operation: &str, err: sqlx::Error) -> AuditStoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            AuditStoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => AuditStoreError::Storage(format!("{operation}: {err}")),
    }
}

struct AuditRow(AuditRecord);

impl<'r> sqlx::FromRow<'r, PgRow> for AuditRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let action: String = row.try_get("action")?;
        let action = AuditAction::parse(&action).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "action".to_string(),
            source: format!("unknown audit action '{action}'").into(),
        })?;
        let old_values: serde_json::Value = row.try_get("old_values")?;
        let new_values: serde_json::Value = row.try_get("new_values")?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

        Ok(AuditRow(AuditRecord {
            id: AuditRecordId::from_uuid(row.try_get("id")?),
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            action,
            old_values: field_map(old_values)?,
            new_values: field_map(new_values)?,
            actor_id: row.try_get::<Option<Uuid>, _>("actor_id")?.map(UserId::from_uuid),
            tenant_id: row.try_get::<Option<Uuid>, _>("tenant_id")?.map(TenantId::from_uuid),
            timestamp: recorded_at,
        }))
    }
}

fn field_map(value: serde_json::Value) -> Result<FieldMap, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, query: &AuditQuery) {
    builder.push(" WHERE TRUE");
    if let Some(tenant_id) = query.tenant_id {
        builder.push(" AND tenant_id = ").push_bind(*tenant_id.as_uuid());
    }
    if let Some(entity_type) = &query.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(entity_id) = &query.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip(self, records), fields(records = records.len()), err)]
    async fn append(&self, records: Vec<NewAuditRecord>) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_audit_error("begin_transaction", e))?;
        let mut written = Vec::with_capacity(records.len());

        for record in records {
            let record = AuditRecord::from_new(AuditRecordId::new(), record);
            let old_values = serde_json::to_value(&record.old_values)
                .map_err(|e| AuditStoreError::Storage(format!("encode old_values: {e}")))?;
            let new_values = serde_json::to_value(&record.new_values)
                .map_err(|e| AuditStoreError::Storage(format!("encode new_values: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO audit_records (
                    id, entity_type, entity_id, action, old_values, new_values, actor_id, tenant_id, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id.as_uuid())
            .bind(&record.entity_type)
            .bind(&record.entity_id)
            .bind(record.action.as_str())
            .bind(old_values)
            .bind(new_values)
            .bind(record.actor_id.map(Uuid::from))
            .bind(record.tenant_id.map(Uuid::from))
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_audit_error("insert_audit_record", e))?;

            written.push(record);
        }

        tx.commit().await.map_err(|e| map_audit_error("commit_transaction", e))?;
        Ok(written)
    }

    #[instrument(skip(self), err)]
    async fn query(&self, query: &AuditQuery, page: PageRequest) -> Result<Page<AuditRecord>, AuditStoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM audit_records");
        push_filters(&mut count, query);
        let total: i64 = count
            .build()
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_audit_error("count_audit_records", e))?;

        let mut select = QueryBuilder::new(
            "SELECT id, entity_type, entity_id, action, old_values, new_values, actor_id, tenant_id, recorded_at \
             FROM audit_records",
        );
        push_filters(&mut select, query);
        select
            .push(" ORDER BY recorded_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_audit_error("query_audit_records", e))?;

        let items = rows
            .iter()
            .map(|row| {
                <AuditRow as sqlx::FromRow<PgRow>>::from_row(row)
                    .map(|r| r.0)
                    .map_err(|e| map_audit_error("decode_audit_record", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, page, total.max(0) as u64))
    }
}
