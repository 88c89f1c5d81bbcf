//! Database operations for the `sentiment_items` table — the dedup store.
//!
//! The identity key is `(platform, external_id)`. [`save_item`] is a single
//! atomic upsert, so concurrent saves of the same key are serialized by
//! Postgres row locking and replaying a fetch can never create a duplicate
//! row.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `sentiment_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SentimentItemRow {
    pub id: i64,
    pub platform: String,
    pub external_id: String,
    pub target_id: Option<i64>,
    pub symbol: Option<String>,
    pub root_post_id: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub heat_score: Option<f64>,
    pub topic: Option<String>,
    pub extra: Option<Value>,
}

/// Fields for saving one observed item.
#[derive(Debug, Clone)]
pub struct NewSentimentItem {
    pub platform: String,
    pub external_id: String,
    pub target_id: Option<i64>,
    pub symbol: Option<String>,
    pub root_post_id: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub heat_score: Option<f64>,
    pub topic: Option<String>,
    pub extra: Option<Value>,
}

/// What a [`save_item`] call did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First observation of this identity key.
    Inserted,
    /// Key existed; mutable fields (heat score, content) were rewritten.
    Updated,
    /// Key existed and the observation carried no field changes.
    Unchanged,
}

/// Query filters for the snapshot read path.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub platform: Option<String>,
    pub symbol: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub keyword: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Save one observed item, deduplicating on `(platform, external_id)`.
///
/// A fresh key inserts; an existing key updates heat score and content in
/// place only when they actually changed. The whole decision runs in one
/// statement — `(xmax = 0)` distinguishes a fresh insert from a conflict
/// update, and the `DO UPDATE ... WHERE` guard returns no row at all for a
/// no-op observation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn save_item(pool: &PgPool, item: &NewSentimentItem) -> Result<SaveOutcome, DbError> {
    let inserted: Option<bool> = sqlx::query_scalar(
        "INSERT INTO sentiment_items \
             (platform, external_id, target_id, symbol, root_post_id, author_id, \
              author_name, content, url, posted_at, heat_score, topic, extra) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (platform, external_id) DO UPDATE SET \
             heat_score = EXCLUDED.heat_score, \
             content    = EXCLUDED.content, \
             fetched_at = NOW() \
         WHERE sentiment_items.heat_score IS DISTINCT FROM EXCLUDED.heat_score \
            OR sentiment_items.content    IS DISTINCT FROM EXCLUDED.content \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&item.platform)
    .bind(&item.external_id)
    .bind(item.target_id)
    .bind(&item.symbol)
    .bind(&item.root_post_id)
    .bind(&item.author_id)
    .bind(&item.author_name)
    .bind(&item.content)
    .bind(&item.url)
    .bind(item.posted_at)
    .bind(item.heat_score)
    .bind(&item.topic)
    .bind(&item.extra)
    .fetch_optional(pool)
    .await?;

    Ok(match inserted {
        Some(true) => SaveOutcome::Inserted,
        Some(false) => SaveOutcome::Updated,
        None => SaveOutcome::Unchanged,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ItemFilter) {
    builder.push(" WHERE TRUE");
    if let Some(platform) = &filter.platform {
        builder.push(" AND platform = ").push_bind(platform.clone());
    }
    if let Some(symbol) = &filter.symbol {
        builder.push(" AND symbol = ").push_bind(symbol.clone());
    }
    if let Some(from) = filter.from {
        builder.push(" AND posted_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND posted_at <= ").push_bind(to);
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = format!("%{keyword}%");
        builder
            .push(" AND (content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR topic ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Query stored items with filters and pagination.
///
/// Returns the page of rows (ordered `posted_at DESC, id DESC`) and the total
/// match count before pagination. `page` is 1-based; `page_size` is clamped
/// to 1..=200.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn query_items(
    pool: &PgPool,
    filter: &ItemFilter,
) -> Result<(Vec<SentimentItemRow>, i64), DbError> {
    let page = filter.page.max(1);
    let page_size = filter.page_size.clamp(1, 200);

    let mut count_builder: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM sentiment_items");
    push_filters(&mut count_builder, filter);
    let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT id, platform, external_id, target_id, symbol, root_post_id, author_id, \
                author_name, content, url, posted_at, fetched_at, heat_score, topic, extra \
         FROM sentiment_items",
    );
    push_filters(&mut builder, filter);
    builder
        .push(" ORDER BY posted_at DESC NULLS LAST, id DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind((page - 1) * page_size);

    let rows = builder
        .build_query_as::<SentimentItemRow>()
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}
