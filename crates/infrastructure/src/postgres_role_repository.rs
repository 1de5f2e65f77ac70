use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use warden_application::RoleRepository;
use warden_core::{AppError, AppResult, ScopeContext, UserId};
use warden_domain::{Permission, PermissionCode, Role, ScopeLevel};

/// PostgreSQL-backed repository for role definitions and assignments.
///
/// Reads widen tenant scopes to include platform rows; mutations bind
/// the exact scope so a tenant operation never touches a platform
/// assignment.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    role_id: Uuid,
    role_code: String,
    role_level: i32,
    role_scope_level: String,
    priority: i32,
    permission_id: Option<Uuid>,
    permission_code: Option<String>,
    permission_scope_level: Option<String>,
    is_dangerous: Option<bool>,
    requires_mfa: Option<bool>,
    requires_approval: Option<bool>,
}

/// Folds one-row-per-grant join output into roles with permission sets.
fn aggregate_roles(rows: Vec<RoleRow>) -> AppResult<Vec<Role>> {
    let mut roles: Vec<Role> = Vec::new();

    for row in rows {
        if roles.last().is_none_or(|last| last.id != row.role_id) {
            let scope_level =
                ScopeLevel::from_str(row.role_scope_level.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "failed to decode role scope level '{}': {error}",
                        row.role_scope_level
                    ))
                })?;
            roles.push(Role {
                id: row.role_id,
                code: row.role_code.clone(),
                role_level: row.role_level,
                scope_level,
                priority: row.priority,
                permissions: Vec::new(),
            });
        }

        let (Some(id), Some(code), Some(scope_level)) = (
            row.permission_id,
            row.permission_code.as_deref(),
            row.permission_scope_level.as_deref(),
        ) else {
            continue;
        };

        let code = PermissionCode::parse(code).map_err(|error| {
            AppError::Internal(format!("failed to decode permission code '{code}': {error}"))
        })?;
        let scope_level = ScopeLevel::from_str(scope_level).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode permission scope level '{scope_level}': {error}"
            ))
        })?;

        if let Some(role) = roles.last_mut() {
            role.permissions.push(Permission {
                id,
                code,
                scope_level,
                is_dangerous: row.is_dangerous.unwrap_or(false),
                requires_mfa: row.requires_mfa.unwrap_or(false),
                requires_approval: row.requires_approval.unwrap_or(false),
            });
        }
    }

    Ok(roles)
}

const ROLE_COLUMNS: &str = r#"
    roles.id AS role_id,
    roles.code AS role_code,
    roles.role_level,
    roles.scope_level AS role_scope_level,
    roles.priority,
    permissions.id AS permission_id,
    permissions.code AS permission_code,
    permissions.scope_level AS permission_scope_level,
    permissions.is_dangerous,
    permissions.requires_mfa,
    permissions.requires_approval
"#;

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn list_roles_for_user(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
    ) -> AppResult<Vec<Role>> {
        let query = format!(
            r#"
            SELECT {ROLE_COLUMNS}
            FROM role_assignments AS assignments
            INNER JOIN roles
                ON roles.id = assignments.role_id
            LEFT JOIN role_permissions
                ON role_permissions.role_id = roles.id
            LEFT JOIN permissions
                ON permissions.id = role_permissions.permission_id
                AND permissions.deleted_at IS NULL
            WHERE assignments.user_id = $2
                AND assignments.is_active
                AND (assignments.expires_at IS NULL OR assignments.expires_at > NOW())
                AND (assignments.tenant_id = $1 OR assignments.tenant_id IS NULL)
                AND roles.is_active
            ORDER BY roles.id, permissions.code
            "#
        );

        let rows = sqlx::query_as::<_, RoleRow>(query.as_str())
            .bind(scope.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to load user roles: {error}"))
            })?;

        aggregate_roles(rows)
    }

    async fn find_role_by_code(
        &self,
        scope: ScopeContext,
        role_code: &str,
    ) -> AppResult<Option<Role>> {
        let query = format!(
            r#"
            SELECT {ROLE_COLUMNS}
            FROM roles
            LEFT JOIN role_permissions
                ON role_permissions.role_id = roles.id
            LEFT JOIN permissions
                ON permissions.id = role_permissions.permission_id
                AND permissions.deleted_at IS NULL
            WHERE roles.code = $2
                AND (roles.tenant_id = $1 OR roles.tenant_id IS NULL)
                AND roles.is_active
            ORDER BY roles.id, permissions.code
            "#
        );

        let rows = sqlx::query_as::<_, RoleRow>(query.as_str())
            .bind(scope.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
            .bind(role_code)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to resolve role: {error}")))?;

        Ok(aggregate_roles(rows)?.into_iter().next())
    }

    async fn insert_assignment(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        role_id: Uuid,
        granted_by: &UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let tenant_uuid = scope.tenant_id().map(|tenant_id| tenant_id.as_uuid());

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Unavailable(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            UPDATE role_assignments
            SET is_active = FALSE
            WHERE user_id = $2
                AND role_id = $3
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(tenant_uuid)
        .bind(user_id.as_str())
        .bind(role_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to supersede prior assignment: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO role_assignments
                (user_id, role_id, tenant_id, granted_by, granted_at, expires_at, is_active)
            VALUES ($2, $3, $1, $4, NOW(), $5, TRUE)
            "#,
        )
        .bind(tenant_uuid)
        .bind(user_id.as_str())
        .bind(role_id)
        .bind(granted_by.as_str())
        .bind(expires_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to persist assignment: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Unavailable(format!("failed to commit transaction: {error}"))
        })
    }

    async fn deactivate_assignment(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        role_id: Uuid,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE role_assignments
            SET is_active = FALSE
            WHERE user_id = $2
                AND role_id = $3
                AND tenant_id IS NOT DISTINCT FROM $1
                AND is_active
            "#,
        )
        .bind(scope.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
        .bind(user_id.as_str())
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to revoke assignment: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "no active assignment of role '{role_id}' for user '{user_id}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{RoleRow, aggregate_roles};

    fn row(role_id: Uuid, role_code: &str, permission_code: Option<&str>) -> RoleRow {
        RoleRow {
            role_id,
            role_code: role_code.to_owned(),
            role_level: 1,
            role_scope_level: "tenant".to_owned(),
            priority: 10,
            permission_id: permission_code.map(|_| Uuid::new_v4()),
            permission_code: permission_code.map(str::to_owned),
            permission_scope_level: permission_code.map(|_| "tenant".to_owned()),
            is_dangerous: permission_code.map(|_| false),
            requires_mfa: permission_code.map(|_| false),
            requires_approval: permission_code.map(|_| false),
        }
    }

    #[test]
    fn aggregation_folds_grant_rows_into_roles() {
        let admin_id = Uuid::new_v4();
        let viewer_id = Uuid::new_v4();
        let rows = vec![
            row(admin_id, "admin", Some("users:*")),
            row(admin_id, "admin", Some("orders:read")),
            row(viewer_id, "viewer", None),
        ];

        let roles = aggregate_roles(rows);
        let Ok(roles) = roles else {
            panic!("aggregation must succeed");
        };
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].permissions.len(), 2);
        assert!(roles[1].permissions.is_empty());
    }

    #[test]
    fn aggregation_rejects_undecodable_codes() {
        let rows = vec![row(Uuid::new_v4(), "admin", Some("not-a-code"))];
        assert!(aggregate_roles(rows).is_err());
    }
}
