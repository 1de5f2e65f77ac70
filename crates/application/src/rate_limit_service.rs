use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::{AppError, AppResult};

/// One rate-limit policy: at most `max_attempts` per window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Key namespace the rule applies to, e.g. `"session"`.
    pub category: String,
    /// Attempts allowed inside one window.
    pub max_attempts: i32,
    /// Window length in seconds.
    pub window_seconds: i64,
}

impl RateLimitRule {
    /// Default per-session request limit.
    #[must_use]
    pub fn session_default() -> Self {
        Self {
            category: "session".to_owned(),
            max_attempts: 120,
            window_seconds: 60,
        }
    }
}

/// Attempt counter state after recording one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Attempts recorded in the current window, including this one.
    pub attempt_count: i32,
    /// When the current window started.
    pub window_started_at: DateTime<Utc>,
}

/// Repository port for windowed attempt counting.
#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Records one attempt against a key and returns the window state.
    async fn record_attempt(
        &self,
        key: &str,
        window_duration_seconds: i64,
    ) -> AppResult<AttemptInfo>;

    /// Removes stale counter state. Intended for periodic cleanup.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

/// Application service for rate limiting.
#[derive(Clone)]
pub struct RateLimitService {
    repository: Arc<dyn RateLimitRepository>,
}

impl RateLimitService {
    /// Creates a new rate limit service.
    #[must_use]
    pub fn new(repository: Arc<dyn RateLimitRepository>) -> Self {
        Self { repository }
    }

    /// Records an attempt and returns the attempts left in the window.
    ///
    /// Returns `Err(AppError::RateLimited)` once the limit is exceeded.
    /// The key is combined with the rule category so distinct categories
    /// never share counters.
    pub async fn check_rate_limit(&self, rule: &RateLimitRule, key: &str) -> AppResult<i32> {
        let composite_key = format!("{}:{key}", rule.category);
        let info = self
            .repository
            .record_attempt(&composite_key, rule.window_seconds)
            .await?;

        if info.attempt_count > rule.max_attempts {
            return Err(AppError::RateLimited(
                "too many requests, please try again later".to_owned(),
            ));
        }

        Ok((rule.max_attempts - info.attempt_count).max(0))
    }

    /// Removes expired rate limit entries. Intended for periodic cleanup.
    pub async fn cleanup(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        self.repository.cleanup_expired(cutoff).await
    }
}
