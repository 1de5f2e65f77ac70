use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use warden_application::AccessControlRepository;
use warden_core::{AppError, AppResult, ScopeContext, TenantId, UserId};
use warden_domain::{AccessControlEntry, AccessLevel};

/// PostgreSQL-backed repository for resource access entries.
#[derive(Clone)]
pub struct PostgresAccessControlRepository {
    pool: PgPool,
}

impl PostgresAccessControlRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccessEntryRow {
    user_id: String,
    resource_type: String,
    resource_id: String,
    access_level: String,
    tenant_id: Option<Uuid>,
}

fn decode_entry(row: AccessEntryRow) -> AppResult<AccessControlEntry> {
    let access_level = AccessLevel::from_str(row.access_level.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode access level '{}': {error}",
            row.access_level
        ))
    })?;

    Ok(AccessControlEntry {
        user_id: UserId::new(row.user_id),
        resource_type: row.resource_type,
        resource_id: row.resource_id,
        access_level,
        tenant_id: row.tenant_id.map(TenantId::from_uuid),
    })
}

#[async_trait]
impl AccessControlRepository for PostgresAccessControlRepository {
    async fn find_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Option<AccessControlEntry>> {
        let row = sqlx::query_as::<_, AccessEntryRow>(
            r#"
            SELECT user_id, resource_type, resource_id, access_level, tenant_id
            FROM access_control_entries
            WHERE user_id = $2
                AND resource_type = $3
                AND resource_id = $4
                AND is_active
                AND (tenant_id = $1 OR tenant_id IS NULL)
            ORDER BY granted_at DESC
            LIMIT 1
            "#,
        )
        .bind(scope.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
        .bind(user_id.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to load access entry: {error}"))
        })?;

        row.map(decode_entry).transpose()
    }

    async fn upsert_entry(&self, entry: &AccessControlEntry, granted_by: &UserId) -> AppResult<()> {
        let tenant_uuid = entry.tenant_id.map(|tenant_id| tenant_id.as_uuid());

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Unavailable(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            UPDATE access_control_entries
            SET is_active = FALSE
            WHERE user_id = $2
                AND resource_type = $3
                AND resource_id = $4
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(tenant_uuid)
        .bind(entry.user_id.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to supersede prior entry: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO access_control_entries
                (user_id, resource_type, resource_id, access_level, tenant_id,
                 granted_by, granted_at, is_active)
            VALUES ($2, $3, $4, $5, $1, $6, NOW(), TRUE)
            "#,
        )
        .bind(tenant_uuid)
        .bind(entry.user_id.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id.as_str())
        .bind(entry.access_level.as_str())
        .bind(granted_by.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to persist access entry: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Unavailable(format!("failed to commit transaction: {error}"))
        })
    }

    async fn deactivate_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE access_control_entries
            SET is_active = FALSE
            WHERE user_id = $2
                AND resource_type = $3
                AND resource_id = $4
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(scope.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
        .bind(user_id.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to revoke access entry: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "no active access entry for '{user_id}' on {resource_type}/{resource_id}"
            )));
        }

        Ok(())
    }

    async fn transfer_ownership(
        &self,
        scope: ScopeContext,
        resource_type: &str,
        resource_id: &str,
        from_user: &UserId,
        to_user: &UserId,
        transferred_by: &UserId,
    ) -> AppResult<()> {
        let tenant_uuid = scope.tenant_id().map(|tenant_id| tenant_id.as_uuid());

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Unavailable(format!("failed to begin transaction: {error}"))
        })?;

        let revoked = sqlx::query(
            r#"
            UPDATE access_control_entries
            SET is_active = FALSE
            WHERE user_id = $2
                AND resource_type = $3
                AND resource_id = $4
                AND access_level = 'owner'
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(tenant_uuid)
        .bind(from_user.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to revoke prior ownership: {error}"))
        })?
        .rows_affected();

        if revoked == 0 {
            // rolls back on drop
            return Err(AppError::Conflict(format!(
                "'{from_user}' does not own {resource_type}/{resource_id}"
            )));
        }

        sqlx::query(
            r#"
            UPDATE access_control_entries
            SET is_active = FALSE
            WHERE user_id = $2
                AND resource_type = $3
                AND resource_id = $4
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(tenant_uuid)
        .bind(to_user.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to supersede recipient entry: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO access_control_entries
                (user_id, resource_type, resource_id, access_level, tenant_id,
                 granted_by, granted_at, is_active)
            VALUES ($2, $3, $4, 'owner', $1, $5, NOW(), TRUE)
            "#,
        )
        .bind(tenant_uuid)
        .bind(to_user.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .bind(transferred_by.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to persist new ownership: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Unavailable(format!("failed to commit transaction: {error}"))
        })
    }
}
