use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use warden_application::SessionRepository;
use warden_core::{AppError, AppResult, TenantId, UserId};
use warden_domain::{Session, SessionStatus};

/// PostgreSQL-backed repository for session rows.
///
/// Status transitions are guarded in SQL: only `active` rows move, so a
/// terminal session can never be resurrected or re-terminated.
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    tenant_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    rate_limit_remaining: i32,
}

fn decode_session(row: SessionRow) -> AppResult<Session> {
    let status = SessionStatus::from_str(row.status.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode session status '{}': {error}",
            row.status
        ))
    })?;

    Ok(Session {
        id: row.id,
        user_id: UserId::new(row.user_id),
        tenant_id: row.tenant_id.map(TenantId::from_uuid),
        status,
        created_at: row.created_at,
        expires_at: row.expires_at,
        rate_limit_remaining: row.rate_limit_remaining,
    })
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn upsert_session(&self, session: &Session) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, tenant_id, status, created_at, expires_at, rate_limit_remaining)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET tenant_id = EXCLUDED.tenant_id,
                expires_at = EXCLUDED.expires_at,
                rate_limit_remaining = EXCLUDED.rate_limit_remaining
            WHERE sessions.status = 'active'
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.user_id.as_str())
        .bind(session.tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.rate_limit_remaining)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to persist session: {error}"))
        })?;

        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> AppResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, tenant_id, status, created_at, expires_at, rate_limit_remaining
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to load session: {error}")))?;

        row.map(decode_session).transpose()
    }

    async fn mark_session(&self, session_id: &str, status: SessionStatus) -> AppResult<u64> {
        if !SessionStatus::Active.can_transition_to(status) {
            return Err(AppError::Validation(format!(
                "'{status}' is not a terminal session status"
            )));
        }

        let rows_affected = sqlx::query(
            r#"
            UPDATE sessions
            SET status = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to update session status: {error}"))
        })?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn mark_user_sessions(
        &self,
        user_id: &UserId,
        status: SessionStatus,
    ) -> AppResult<u64> {
        if !SessionStatus::Active.can_transition_to(status) {
            return Err(AppError::Validation(format!(
                "'{status}' is not a terminal session status"
            )));
        }

        let rows_affected = sqlx::query(
            r#"
            UPDATE sessions
            SET status = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to update user sessions: {error}"))
        })?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn expire_sessions(
        &self,
        expired_before: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> AppResult<u64> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'expired'
            WHERE status = 'active'
                AND (expires_at <= $1 OR created_at <= $2)
            "#,
        )
        .bind(expired_before)
        .bind(created_before)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to expire sessions: {error}"))
        })?
        .rows_affected();

        Ok(rows_affected)
    }
}
