//! Database operations for the `platform_sessions` table.
//!
//! One row per platform, created on first authentication attempt and never
//! deleted; health transitions only rewrite `status` and the failure counter.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// Session status values as stored in `platform_sessions.status`.
pub mod status {
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const HEALTHY: &str = "healthy";
    pub const DEGRADED: &str = "degraded";
    pub const EXPIRED: &str = "expired";
}

/// A row from the `platform_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub platform: String,
    pub username: Option<String>,
    pub credential: Option<Value>,
    pub status: String,
    pub consecutive_failures: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SESSION_COLUMNS: &str = "id, platform, username, credential, status, \
     consecutive_failures, last_login_at, last_error, created_at, updated_at";

/// Fetch the session row for a platform, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_session_row(pool: &PgPool, platform: &str) -> Result<Option<SessionRow>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM platform_sessions WHERE platform = $1"
    ))
    .bind(platform)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Record a successful authentication: store the fresh credential, mark the
/// session healthy, and reset the failure counter.
///
/// Inserts the row if the platform has never authenticated before.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_login_success(
    pool: &PgPool,
    platform: &str,
    username: &str,
    credential: &Value,
) -> Result<SessionRow, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO platform_sessions \
             (platform, username, credential, status, consecutive_failures, last_login_at, last_error) \
         VALUES ($1, $2, $3, '{healthy}', 0, NOW(), NULL) \
         ON CONFLICT (platform) DO UPDATE SET \
             username             = EXCLUDED.username, \
             credential           = EXCLUDED.credential, \
             status               = '{healthy}', \
             consecutive_failures = 0, \
             last_login_at        = NOW(), \
             last_error           = NULL, \
             updated_at           = NOW() \
         RETURNING {SESSION_COLUMNS}",
        healthy = status::HEALTHY,
    ))
    .bind(platform)
    .bind(username)
    .bind(credential)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Record a failed authentication attempt. The session keeps its prior
/// status; only `last_error` is rewritten, so a timed-out manual login does
/// not invalidate a still-working credential.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_login_failure(
    pool: &PgPool,
    platform: &str,
    error: &str,
) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO platform_sessions (platform, status, last_error) \
         VALUES ($1, '{unauth}', $2) \
         ON CONFLICT (platform) DO UPDATE SET \
             last_error = EXCLUDED.last_error, \
             updated_at = NOW()",
        unauth = status::UNAUTHENTICATED,
    ))
    .bind(platform)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed use of the session (auth rejected mid-fetch). Increments
/// the consecutive-failure counter; once it reaches `max_failures` the session
/// is expired, forcing re-authentication on the next acquisition.
///
/// Returns the updated row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_use_failure(
    pool: &PgPool,
    platform: &str,
    error: &str,
    max_failures: i32,
) -> Result<SessionRow, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO platform_sessions (platform, status, consecutive_failures, last_error) \
         VALUES ($1, '{degraded}', 1, $2) \
         ON CONFLICT (platform) DO UPDATE SET \
             consecutive_failures = platform_sessions.consecutive_failures + 1, \
             status = CASE \
                 WHEN platform_sessions.consecutive_failures + 1 >= $3 THEN '{expired}' \
                 ELSE '{degraded}' \
             END, \
             last_error = EXCLUDED.last_error, \
             updated_at = NOW() \
         RETURNING {SESSION_COLUMNS}",
        degraded = status::DEGRADED,
        expired = status::EXPIRED,
    ))
    .bind(platform)
    .bind(error)
    .bind(max_failures)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Clear the failure counter and mark the session healthy after a successful
/// use of the existing credential.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the platform has no session row, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn reset_session_health(pool: &PgPool, platform: &str) -> Result<(), DbError> {
    let result = sqlx::query(&format!(
        "UPDATE platform_sessions \
         SET status = '{healthy}', consecutive_failures = 0, last_error = NULL, updated_at = NOW() \
         WHERE platform = $1",
        healthy = status::HEALTHY,
    ))
    .bind(platform)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
