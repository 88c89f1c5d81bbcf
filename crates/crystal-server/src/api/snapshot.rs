use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crystal_core::Platform;
use crystal_db::ItemFilter;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotQuery {
    pub platform: Option<String>,
    pub symbol: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SnapshotItem {
    id: i64,
    platform: String,
    external_id: String,
    symbol: Option<String>,
    author_id: Option<String>,
    author_name: Option<String>,
    content: Option<String>,
    url: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    fetched_at: DateTime<Utc>,
    heat_score: Option<f64>,
    topic: Option<String>,
    extra: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(super) struct SnapshotData {
    items: Vec<SnapshotItem>,
    total: i64,
    page: i64,
    page_size: i64,
}

pub(super) async fn get_snapshot(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ApiResponse<SnapshotData>>, ApiError> {
    if let Some(platform) = &query.platform {
        if platform.parse::<Platform>().is_err() {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("unknown platform: {platform}"),
            ));
        }
    }

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(50).clamp(1, 200);
    let filter = ItemFilter {
        platform: query.platform,
        symbol: query.symbol,
        from: query.from,
        to: query.to,
        keyword: query.keyword,
        page,
        page_size,
    };

    let (rows, total) = crystal_db::query_items(&state.pool, &filter)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let items = rows
        .into_iter()
        .map(|row| SnapshotItem {
            id: row.id,
            platform: row.platform,
            external_id: row.external_id,
            symbol: row.symbol,
            author_id: row.author_id,
            author_name: row.author_name,
            content: row.content,
            url: row.url,
            posted_at: row.posted_at,
            fetched_at: row.fetched_at,
            heat_score: row.heat_score,
            topic: row.topic,
            extra: row.extra,
        })
        .collect();

    Ok(Json(ApiResponse {
        data: SnapshotData {
            items,
            total,
            page,
            page_size,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
