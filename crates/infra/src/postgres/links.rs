//! Link storage over Postgres.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use hrgate_auth::{Role, RolePermission, User, UserRole};
use hrgate_core::{PermissionId, RoleId, TenantId, UserId};

use super::{PostgresAccessStore, map_sqlx_error};
use crate::links::{replace_delta, role_link, user_link};
use crate::{LinkDelta, LinkStore, PermissionSetGuard, RoleDetachment, StoreError};

/// Lock the role row and read its current permission set.
async fn lock_role_set(
    tx: &mut Transaction<'_, Postgres>,
    role_id: RoleId,
) -> Result<BTreeSet<PermissionId>, StoreError> {
    sqlx::query("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
        .bind(role_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_role", e))?
        .ok_or(StoreError::NotFound)?;

    let rows = sqlx::query("SELECT permission_id FROM role_permissions WHERE role_id = $1")
        .bind(role_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_role_permissions", e))?;

    rows.iter()
        .map(|row| {
            row.try_get::<Uuid, _>("permission_id")
                .map(PermissionId::from_uuid)
                .map_err(|e| map_sqlx_error("decode_role_permission", e))
        })
        .collect()
}

/// Links may only reference existing, active permissions.
async fn check_grantable(tx: &mut Transaction<'_, Postgres>, ids: &[PermissionId]) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    let rows = sqlx::query("SELECT id, code, is_active FROM permissions WHERE id = ANY($1) FOR SHARE")
        .bind(&uuids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_permissions", e))?;

    if rows.len() != uuids.len() {
        return Err(StoreError::NotFound);
    }
    for row in &rows {
        let active: bool = row.try_get("is_active").map_err(|e| map_sqlx_error("check_permissions", e))?;
        if !active {
            let code: String = row.try_get("code").map_err(|e| map_sqlx_error("check_permissions", e))?;
            return Err(StoreError::Rejected(format!("permission '{code}' is inactive")));
        }
    }
    Ok(())
}

async fn insert_links(
    tx: &mut Transaction<'_, Postgres>,
    role: &Role,
    ids: &[PermissionId],
) -> Result<(), StoreError> {
    for id in ids {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id, tenant_id) VALUES ($1, $2, $3)")
            .bind(role.id.as_uuid())
            .bind(id.as_uuid())
            .bind(role.tenant_id.map(Uuid::from))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_role_permission", e))?;
    }
    Ok(())
}

async fn delete_links(
    tx: &mut Transaction<'_, Postgres>,
    role: &Role,
    ids: &[PermissionId],
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
        .bind(role.id.as_uuid())
        .bind(&uuids)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_role_permissions", e))?;
    Ok(())
}

fn decode_ids<T>(rows: &[sqlx::postgres::PgRow], column: &str, wrap: fn(Uuid) -> T) -> Result<BTreeSet<T>, StoreError>
where
    T: Ord,
{
    rows.iter()
        .map(|row| {
            row.try_get::<Uuid, _>(column)
                .map(wrap)
                .map_err(|e| map_sqlx_error("decode_ids", e))
        })
        .collect()
}

impl PostgresAccessStore {
    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
    tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))
}

#[async_trait]
impl LinkStore for PostgresAccessStore {
    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn role_permissions(&self, role_id: RoleId) -> Result<BTreeSet<PermissionId>, StoreError> {
        let exists = sqlx::query("SELECT 1 FROM roles WHERE id = $1")
            .bind(role_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let rows = sqlx::query("SELECT permission_id FROM role_permissions WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_permissions", e))?;
        decode_ids(&rows, "permission_id", PermissionId::from_uuid)
    }

    #[instrument(skip(self, role, requested, guard), fields(role_id = %role.id, requested = requested.len(), added = tracing::field::Empty), err)]
    async fn grant_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError> {
        let mut tx = self.begin().await?;
        let mut resulting = lock_role_set(&mut tx, role.id).await?;
        let added: Vec<PermissionId> = requested.difference(&resulting).copied().collect();
        if added.is_empty() {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(Vec::new());
        }

        check_grantable(&mut tx, &added).await?;
        resulting.extend(added.iter().copied());
        guard.check(&resulting)?;

        insert_links(&mut tx, role, &added).await?;
        commit(tx).await?;

        Span::current().record("added", added.len());
        Ok(added.into_iter().map(|id| role_link(role, id)).collect())
    }

    #[instrument(skip(self, role, requested, guard), fields(role_id = %role.id, requested = requested.len(), removed = tracing::field::Empty), err)]
    async fn revoke_permissions(
        &self,
        role: &Role,
        requested: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<Vec<RolePermission>, StoreError> {
        let mut tx = self.begin().await?;
        let mut resulting = lock_role_set(&mut tx, role.id).await?;
        let removed: Vec<PermissionId> = requested.intersection(&resulting).copied().collect();
        if removed.is_empty() {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(Vec::new());
        }

        for id in &removed {
            resulting.remove(id);
        }
        guard.check(&resulting)?;

        delete_links(&mut tx, role, &removed).await?;
        commit(tx).await?;

        Span::current().record("removed", removed.len());
        Ok(removed.into_iter().map(|id| role_link(role, id)).collect())
    }

    #[instrument(skip(self, role, target, guard), fields(role_id = %role.id, target = target.len()), err)]
    async fn replace_permissions(
        &self,
        role: &Role,
        target: &BTreeSet<PermissionId>,
        guard: &dyn PermissionSetGuard,
    ) -> Result<LinkDelta, StoreError> {
        let mut tx = self.begin().await?;
        let current = lock_role_set(&mut tx, role.id).await?;
        let (added, removed) = replace_delta(&current, target);
        if added.is_empty() && removed.is_empty() {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(LinkDelta::default());
        }

        check_grantable(&mut tx, &added).await?;
        guard.check(target)?;

        delete_links(&mut tx, role, &removed).await?;
        insert_links(&mut tx, role, &added).await?;
        commit(tx).await?;

        Ok(LinkDelta {
            added: added.into_iter().map(|id| role_link(role, id)).collect(),
            removed: removed.into_iter().map(|id| role_link(role, id)).collect(),
        })
    }

    #[instrument(skip(self), fields(permission_id = %permission_id), err)]
    async fn roles_referencing_permission(&self, permission_id: PermissionId) -> Result<BTreeSet<RoleId>, StoreError> {
        let rows = sqlx::query("SELECT role_id FROM role_permissions WHERE permission_id = $1")
            .bind(permission_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles_referencing_permission", e))?;
        decode_ids(&rows, "role_id", RoleId::from_uuid)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn user_roles(&self, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError> {
        let rows = sqlx::query("SELECT role_id FROM user_roles WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_roles", e))?;
        decode_ids(&rows, "role_id", RoleId::from_uuid)
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn users_with_role(&self, role_id: RoleId) -> Result<BTreeSet<UserId>, StoreError> {
        let rows = sqlx::query("SELECT user_id FROM user_roles WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("users_with_role", e))?;
        decode_ids(&rows, "user_id", UserId::from_uuid)
    }

    #[instrument(skip(self, user, roles), fields(user_id = %user.id, roles = roles.len()), err)]
    async fn assign_roles(&self, user: &User, roles: &[Role]) -> Result<Vec<UserRole>, StoreError> {
        let mut tx = self.begin().await?;
        let mut added = Vec::new();
        for role in roles {
            let inserted = sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id, tenant_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, role_id) DO NOTHING
                "#,
            )
            .bind(user.id.as_uuid())
            .bind(role.id.as_uuid())
            .bind(user.tenant_id.map(Uuid::from))
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_sqlx_error("assign_role", e) {
                StoreError::Rejected(_) => StoreError::NotFound,
                other => other,
            })?;
            if inserted.rows_affected() > 0 {
                added.push(user_link(user, role.id));
            }
        }
        commit(tx).await?;
        Ok(added)
    }

    #[instrument(skip(self, user, role_ids), fields(user_id = %user.id, roles = role_ids.len()), err)]
    async fn unassign_roles(&self, user: &User, role_ids: &BTreeSet<RoleId>) -> Result<Vec<UserRole>, StoreError> {
        let uuids: Vec<Uuid> = role_ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = ANY($2) RETURNING role_id")
            .bind(user.id.as_uuid())
            .bind(&uuids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("unassign_roles", e))?;
        let removed = decode_ids(&rows, "role_id", RoleId::from_uuid)?;
        Ok(removed.into_iter().map(|role_id| user_link(user, role_id)).collect())
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn detach_role(&self, role: &Role) -> Result<RoleDetachment, StoreError> {
        let mut tx = self.begin().await?;
        let permissions = lock_role_set(&mut tx, role.id).await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("detach_role_permissions", e))?;

        let rows = sqlx::query("DELETE FROM user_roles WHERE role_id = $1 RETURNING user_id, tenant_id")
            .bind(role.id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("detach_role_users", e))?;
        commit(tx).await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            let user_id: Uuid = row.try_get("user_id").map_err(|e| map_sqlx_error("detach_role_users", e))?;
            let tenant_id: Option<Uuid> = row.try_get("tenant_id").map_err(|e| map_sqlx_error("detach_role_users", e))?;
            users.push(UserRole {
                user_id: UserId::from_uuid(user_id),
                role_id: role.id,
                tenant_id: tenant_id.map(TenantId::from_uuid),
            });
        }

        Ok(RoleDetachment {
            permissions: permissions.into_iter().map(|id| role_link(role, id)).collect(),
            users,
        })
    }
}
