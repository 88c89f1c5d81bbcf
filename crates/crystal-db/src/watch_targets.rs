//! Database operations for the `watch_targets` table.
//!
//! The crawler treats this table as a read-only snapshot taken at the start
//! of each platform's fetch; the write path exists for the thin watchlist API
//! and for seeding.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `watch_targets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WatchTargetRow {
    pub id: i64,
    pub platform: String,
    pub kind: String,
    pub external_id: Option<String>,
    pub symbol: Option<String>,
    pub keyword: Option<String>,
    pub display_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchTargetRow {
    /// Convert the row into the domain type the crawler consumes.
    ///
    /// Returns `None` when the stored platform or kind string does not parse;
    /// callers skip and log such rows rather than failing the whole fetch.
    #[must_use]
    pub fn to_domain(&self) -> Option<crystal_core::WatchTarget> {
        Some(crystal_core::WatchTarget {
            id: self.id,
            platform: self.platform.parse().ok()?,
            kind: self.kind.parse().ok()?,
            external_id: self.external_id.clone(),
            symbol: self.symbol.clone(),
            keyword: self.keyword.clone(),
            display_name: self.display_name.clone(),
        })
    }
}

/// Fields for creating a watch target.
#[derive(Debug, Clone)]
pub struct NewWatchTarget {
    pub platform: String,
    pub kind: String,
    pub external_id: Option<String>,
    pub symbol: Option<String>,
    pub keyword: Option<String>,
    pub display_name: String,
}

const TARGET_COLUMNS: &str =
    "id, platform, kind, external_id, symbol, keyword, display_name, enabled, \
     created_at, updated_at";

/// List enabled targets for one platform, ordered by id for stable fetch order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_enabled_targets(
    pool: &PgPool,
    platform: &str,
) -> Result<Vec<WatchTargetRow>, DbError> {
    let rows = sqlx::query_as::<_, WatchTargetRow>(&format!(
        "SELECT {TARGET_COLUMNS} FROM watch_targets \
         WHERE platform = $1 AND enabled = TRUE \
         ORDER BY id"
    ))
    .bind(platform)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List all targets, optionally filtered by platform.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_watch_targets(
    pool: &PgPool,
    platform: Option<&str>,
) -> Result<Vec<WatchTargetRow>, DbError> {
    let rows = match platform {
        Some(p) => {
            sqlx::query_as::<_, WatchTargetRow>(&format!(
                "SELECT {TARGET_COLUMNS} FROM watch_targets WHERE platform = $1 ORDER BY id"
            ))
            .bind(p)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, WatchTargetRow>(&format!(
                "SELECT {TARGET_COLUMNS} FROM watch_targets ORDER BY id"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows)
}

/// Insert a new watch target and return the created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_watch_target(
    pool: &PgPool,
    target: &NewWatchTarget,
) -> Result<WatchTargetRow, DbError> {
    let row = sqlx::query_as::<_, WatchTargetRow>(&format!(
        "INSERT INTO watch_targets (platform, kind, external_id, symbol, keyword, display_name) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {TARGET_COLUMNS}"
    ))
    .bind(&target.platform)
    .bind(&target.kind)
    .bind(&target.external_id)
    .bind(&target.symbol)
    .bind(&target.keyword)
    .bind(&target.display_name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Enable or disable a target.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no target exists with the given id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_watch_target_enabled(
    pool: &PgPool,
    id: i64,
    enabled: bool,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE watch_targets SET enabled = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(enabled)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Delete a target.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no target exists with the given id, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_watch_target(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM watch_targets WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
