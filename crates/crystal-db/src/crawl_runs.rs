//! Database operations for `crawl_runs` and `crawl_run_platforms`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `crawl_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_kind: String,
    pub status: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `crawl_run_platforms` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunPlatformRow {
    pub id: i64,
    pub crawl_run_id: i64,
    pub platform: String,
    pub status: String,
    pub items_seen: i32,
    pub items_saved: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, trigger_kind, status, window_start, window_end, \
     started_at, ended_at, error_summary, created_at";

// ---------------------------------------------------------------------------
// crawl_runs operations
// ---------------------------------------------------------------------------

/// Creates a new crawl run in `running` status with a fresh public UUID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_crawl_run(
    pool: &PgPool,
    trigger_kind: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<CrawlRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "INSERT INTO crawl_runs (public_id, trigger_kind, status, window_start, window_end) \
         VALUES ($1, $2, 'running', $3, $4) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(trigger_kind)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Finalizes a run: sets the terminal status, `ended_at`, and the error
/// summary. Guarded so a finalized run is immutable — finalizing twice is an
/// error.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not in
/// `running` status, or [`DbError::Sqlx`] if the update fails.
pub async fn finalize_crawl_run(
    pool: &PgPool,
    id: i64,
    status: &str,
    error_summary: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = $1, ended_at = NOW(), error_summary = $2 \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(status)
    .bind(error_summary)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCrawlRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_crawl_run(pool: &PgPool, id: i64) -> Result<CrawlRunRow, DbError> {
    let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Fetches a single run by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_crawl_run_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<CrawlRunRow, DbError> {
    let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` runs, ordered by `created_at DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_runs(pool: &PgPool, limit: i64) -> Result<Vec<CrawlRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// crawl_run_platforms operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-platform result row for a crawl run.
///
/// Conflicts on `(crawl_run_id, platform)` update status, counts, and the
/// error message in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_crawl_run_platform(
    pool: &PgPool,
    run_id: i64,
    platform: &str,
    status: &str,
    items_seen: i32,
    items_saved: i32,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO crawl_run_platforms \
             (crawl_run_id, platform, status, items_seen, items_saved, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (crawl_run_id, platform) DO UPDATE SET \
             status        = EXCLUDED.status, \
             items_seen    = EXCLUDED.items_seen, \
             items_saved   = EXCLUDED.items_saved, \
             error_message = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(platform)
    .bind(status)
    .bind(items_seen)
    .bind(items_saved)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all platform-level result rows for a given crawl run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_run_platforms(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<CrawlRunPlatformRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunPlatformRow>(
        "SELECT id, crawl_run_id, platform, status, items_seen, items_saved, \
                error_message, created_at \
         FROM crawl_run_platforms \
         WHERE crawl_run_id = $1 \
         ORDER BY platform",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
