//! Entity repositories over Postgres.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;
use uuid::Uuid;

use hrgate_auth::{NewPermission, NewRole, NewUser, Permission, PermissionCode, Role, User};
use hrgate_core::{PermissionId, RoleId, TenantId, UserId};

use super::{PostgresAccessStore, map_sqlx_error};
use crate::{Repository, StoreError};

const ROLE_COLUMNS: &str = "id, tenant_id, name, description, is_system_role, is_active";
const PERMISSION_COLUMNS: &str = "id, code, module, category, name, description, is_active";
const USER_COLUMNS: &str = "id, tenant_id, display_name, is_active";

pub(super) struct RoleRow(pub Role);

impl<'r> sqlx::FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow(Role {
            id: RoleId::from_uuid(row.try_get("id")?),
            tenant_id: row.try_get::<Option<Uuid>, _>("tenant_id")?.map(TenantId::from_uuid),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_system_role: row.try_get("is_system_role")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

struct PermissionRow(Permission);

impl<'r> sqlx::FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let code: String = row.try_get("code")?;
        Ok(PermissionRow(Permission {
            id: PermissionId::from_uuid(row.try_get("id")?),
            code: PermissionCode::new(code),
            module: row.try_get("module")?,
            category: row.try_get("category")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

struct UserRow(User);

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow(User {
            id: UserId::from_uuid(row.try_get("id")?),
            tenant_id: row.try_get::<Option<Uuid>, _>("tenant_id")?.map(TenantId::from_uuid),
            display_name: row.try_get("display_name")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

fn decode<T>(operation: &str, row: &PgRow) -> Result<T, StoreError>
where
    T: for<'r> sqlx::FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Storage(format!("failed to decode row in {operation}: {e}")))
}

#[async_trait]
impl Repository<Role> for PostgresAccessStore {
    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn get(&self, id: &RoleId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.map(|r| decode::<RoleRow>("get_role", &r).map(|r| r.0)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name, id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(|r| decode::<RoleRow>("list_roles", r).map(|r| r.0)).collect()
    }

    #[instrument(skip(self, draft), fields(name = %draft.name), err)]
    async fn insert(&self, draft: NewRole) -> Result<Role, StoreError> {
        let role = draft.into_role(RoleId::new());
        sqlx::query(
            r#"
            INSERT INTO roles (id, tenant_id, name, description, is_system_role, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.tenant_id.map(Uuid::from))
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_system_role)
        .bind(role.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(role)
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update(&self, role: Role) -> Result<Role, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET tenant_id = $2, name = $3, description = $4, is_system_role = $5, is_active = $6
            WHERE id = $1
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.tenant_id.map(Uuid::from))
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_system_role)
        .bind(role.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete(&self, id: &RoleId) -> Result<Role, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?
            .ok_or(StoreError::NotFound)?;
        decode::<RoleRow>("delete_role", &row).map(|r| r.0)
    }
}

#[async_trait]
impl Repository<Permission> for PostgresAccessStore {
    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn get(&self, id: &PermissionId) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permission", e))?;
        row.map(|r| decode::<PermissionRow>("get_permission", &r).map(|r| r.0))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY code"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter()
            .map(|r| decode::<PermissionRow>("list_permissions", r).map(|r| r.0))
            .collect()
    }

    #[instrument(skip(self, draft), fields(code = %draft.code), err)]
    async fn insert(&self, draft: NewPermission) -> Result<Permission, StoreError> {
        let permission = draft.into_permission(PermissionId::new());
        sqlx::query(
            r#"
            INSERT INTO permissions (id, code, module, category, name, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.code.as_str())
        .bind(&permission.module)
        .bind(&permission.category)
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(permission)
    }

    #[instrument(skip(self, permission), fields(permission_id = %permission.id), err)]
    async fn update(&self, permission: Permission) -> Result<Permission, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET code = $2, module = $3, category = $4, name = $5, description = $6, is_active = $7
            WHERE id = $1
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.code.as_str())
        .bind(&permission.module)
        .bind(&permission.category)
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_permission", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(permission)
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn delete(&self, id: &PermissionId) -> Result<Permission, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM permissions WHERE id = $1 RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_permission", e))?
        .ok_or(StoreError::NotFound)?;
        decode::<PermissionRow>("delete_permission", &row).map(|r| r.0)
    }
}

#[async_trait]
impl Repository<User> for PostgresAccessStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.map(|r| decode::<UserRow>("get_user", &r).map(|r| r.0)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY display_name, id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(|r| decode::<UserRow>("list_users", r).map(|r| r.0)).collect()
    }

    #[instrument(skip(self, draft), err)]
    async fn insert(&self, draft: NewUser) -> Result<User, StoreError> {
        let user = draft.into_user(UserId::new());
        sqlx::query("INSERT INTO users (id, tenant_id, display_name, is_active) VALUES ($1, $2, $3, $4)")
            .bind(user.id.as_uuid())
            .bind(user.tenant_id.map(Uuid::from))
            .bind(&user.display_name)
            .bind(user.is_active)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update(&self, user: User) -> Result<User, StoreError> {
        let result = sqlx::query("UPDATE users SET tenant_id = $2, display_name = $3, is_active = $4 WHERE id = $1")
            .bind(user.id.as_uuid())
            .bind(user.tenant_id.map(Uuid::from))
            .bind(&user.display_name)
            .bind(user.is_active)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete(&self, id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?
            .ok_or(StoreError::NotFound)?;
        decode::<UserRow>("delete_user", &row).map(|r| r.0)
    }
}
