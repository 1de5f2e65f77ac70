use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use warden_application::{EffectivePermission, PermissionRepository};
use warden_core::{AppError, AppResult, ScopeContext, UserId};
use warden_domain::{Permission, PermissionCode, ScopeLevel};

/// PostgreSQL-backed repository for permission lookups.
///
/// Reads widen tenant scopes to include platform rows (`tenant_id IS
/// NULL`), so platform-scope grants hold in every tenant context.
#[derive(Clone)]
pub struct PostgresPermissionRepository {
    pool: PgPool,
}

impl PostgresPermissionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: Uuid,
    code: String,
    scope_level: String,
    is_dangerous: bool,
    requires_mfa: bool,
    requires_approval: bool,
}

#[derive(Debug, FromRow)]
struct GrantedPermissionRow {
    #[sqlx(flatten)]
    permission: PermissionRow,
    role_code: Option<String>,
}

fn decode_permission(row: PermissionRow) -> AppResult<Permission> {
    let code = PermissionCode::parse(row.code.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode permission code '{}': {error}",
            row.code
        ))
    })?;
    let scope_level = ScopeLevel::from_str(row.scope_level.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode scope level '{}': {error}",
            row.scope_level
        ))
    })?;

    Ok(Permission {
        id: row.id,
        code,
        scope_level,
        is_dangerous: row.is_dangerous,
        requires_mfa: row.requires_mfa,
        requires_approval: row.requires_approval,
    })
}

#[async_trait]
impl PermissionRepository for PostgresPermissionRepository {
    async fn list_effective_permissions(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
    ) -> AppResult<Vec<EffectivePermission>> {
        let tenant_uuid = scope.tenant_id().map(|tenant_id| tenant_id.as_uuid());

        let role_rows = sqlx::query_as::<_, GrantedPermissionRow>(
            r#"
            SELECT DISTINCT
                permissions.id,
                permissions.code,
                permissions.scope_level,
                permissions.is_dangerous,
                permissions.requires_mfa,
                permissions.requires_approval,
                roles.code AS role_code
            FROM role_assignments AS assignments
            INNER JOIN roles
                ON roles.id = assignments.role_id
            INNER JOIN role_permissions
                ON role_permissions.role_id = roles.id
            INNER JOIN permissions
                ON permissions.id = role_permissions.permission_id
            WHERE assignments.user_id = $2
                AND assignments.is_active
                AND (assignments.expires_at IS NULL OR assignments.expires_at > NOW())
                AND (assignments.tenant_id = $1 OR assignments.tenant_id IS NULL)
                AND permissions.deleted_at IS NULL
            "#,
        )
        .bind(tenant_uuid)
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to load role permissions: {error}"))
        })?;

        let grant_rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT DISTINCT
                permissions.id,
                permissions.code,
                permissions.scope_level,
                permissions.is_dangerous,
                permissions.requires_mfa,
                permissions.requires_approval
            FROM permission_grants AS grants
            INNER JOIN permissions
                ON permissions.id = grants.permission_id
            WHERE grants.user_id = $2
                AND grants.is_active
                AND (grants.tenant_id = $1 OR grants.tenant_id IS NULL)
                AND permissions.deleted_at IS NULL
            "#,
        )
        .bind(tenant_uuid)
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to load direct grants: {error}"))
        })?;

        let mut effective = Vec::with_capacity(role_rows.len() + grant_rows.len());
        for row in role_rows {
            effective.push(EffectivePermission {
                permission: decode_permission(row.permission)?,
                via_role: row.role_code,
            });
        }
        for row in grant_rows {
            effective.push(EffectivePermission {
                permission: decode_permission(row)?,
                via_role: None,
            });
        }

        Ok(effective)
    }

    async fn find_permission_by_code(
        &self,
        scope: ScopeContext,
        code: &PermissionCode,
    ) -> AppResult<Option<Permission>> {
        let tenant_uuid = scope.tenant_id().map(|tenant_id| tenant_id.as_uuid());

        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT
                permissions.id,
                permissions.code,
                permissions.scope_level,
                permissions.is_dangerous,
                permissions.requires_mfa,
                permissions.requires_approval
            FROM permissions
            WHERE permissions.code = $2
                AND (permissions.tenant_id = $1 OR permissions.tenant_id IS NULL)
                AND permissions.deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(tenant_uuid)
        .bind(code.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to resolve permission: {error}"))
        })?;

        row.map(decode_permission).transpose()
    }
}
