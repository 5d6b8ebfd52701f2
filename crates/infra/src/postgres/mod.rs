//! Postgres-backed access-control and audit storage.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `Rejected` (row still referenced) |
//! | Database (check constraint violation) | `23514` | `Rejected` |
//! | Database (serialization / deadlock) | `40001` / `40P01` | `Storage` (caller may retry) |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / RowNotFound / Other | N/A | `Storage` |
//!
//! ## Atomicity
//!
//! Link writes run in one transaction that first locks the role row
//! (`SELECT ... FOR UPDATE`). Concurrent writers to the same role serialize on
//! that lock, so the delta each one computes is never stale.

mod audit;
mod entities;
mod links;

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, instrument};

use crate::StoreError;

pub use audit::PostgresAuditStore;

const SCHEMA: &str = include_str!("../../migrations/0001_access_control.sql");

/// Postgres store for roles, permissions, users and their links.
#[derive(Debug, Clone)]
pub struct PostgresAccessStore {
    pool: Arc<PgPool>,
}

impl PostgresAccessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        info!("access-control schema ready");
        Ok(())
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") | Some("23514") => StoreError::Rejected(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {}", operation)),
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_every_table() {
        for table in ["permissions", "roles", "users", "role_permissions", "user_roles", "audit_records"] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn non_database_errors_map_to_storage() {
        assert!(matches!(
            map_sqlx_error("query", sqlx::Error::PoolClosed),
            StoreError::Storage(_)
        ));
        assert_eq!(map_sqlx_error("query", sqlx::Error::RowNotFound), StoreError::NotFound);
    }
}
