use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crystal_core::{Platform, TargetKind};
use crystal_db::NewWatchTarget;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct TargetsQuery {
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateTargetRequest {
    pub platform: String,
    pub kind: String,
    pub external_id: Option<String>,
    pub symbol: Option<String>,
    pub keyword: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateTargetRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct TargetItem {
    id: i64,
    platform: String,
    kind: String,
    external_id: Option<String>,
    symbol: Option<String>,
    keyword: Option<String>,
    display_name: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedData {
    id: i64,
    deleted: bool,
}

pub(super) async fn list_targets(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<TargetsQuery>,
) -> Result<Json<ApiResponse<Vec<TargetItem>>>, ApiError> {
    if let Some(platform) = &query.platform {
        if platform.parse::<Platform>().is_err() {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("unknown platform: {platform}"),
            ));
        }
    }

    let rows = crystal_db::list_watch_targets(&state.pool, query.platform.as_deref())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(target_item).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn create_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateTargetRequest>,
) -> Result<Response, ApiError> {
    let kind = validate(&req_id.0, &body)?;

    let row = crystal_db::insert_watch_target(
        &state.pool,
        &NewWatchTarget {
            platform: body.platform,
            kind: kind.as_str().to_owned(),
            external_id: body.external_id,
            symbol: body.symbol,
            keyword: body.keyword,
            display_name: body.display_name,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: target_item(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    )
        .into_response())
}

pub(super) async fn update_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTargetRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    crystal_db::set_watch_target_enabled(&state.pool, id, body.enabled)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: serde_json::json!({"id": id, "enabled": body.enabled}),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn delete_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedData>>, ApiError> {
    crystal_db::delete_watch_target(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: DeletedData { id, deleted: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// A target must parse and carry the field its kind reads.
fn validate(req_id: &str, body: &CreateTargetRequest) -> Result<TargetKind, ApiError> {
    if body.platform.parse::<Platform>().is_err() {
        return Err(ApiError::new(
            req_id.to_owned(),
            "validation_error",
            format!("unknown platform: {}", body.platform),
        ));
    }
    let kind: TargetKind = body.kind.parse().map_err(|_| {
        ApiError::new(
            req_id.to_owned(),
            "validation_error",
            format!("unknown kind: {}", body.kind),
        )
    })?;

    let missing = match kind {
        TargetKind::Account if none_or_empty(body.external_id.as_deref()) => Some("external_id"),
        TargetKind::Symbol if none_or_empty(body.symbol.as_deref()) => Some("symbol"),
        TargetKind::Keyword if none_or_empty(body.keyword.as_deref()) => Some("keyword"),
        _ => None,
    };
    if let Some(field) = missing {
        return Err(ApiError::new(
            req_id.to_owned(),
            "validation_error",
            format!("{} targets require {field}", kind.as_str()),
        ));
    }
    Ok(kind)
}

fn none_or_empty(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn target_item(row: crystal_db::WatchTargetRow) -> TargetItem {
    TargetItem {
        id: row.id,
        platform: row.platform,
        kind: row.kind,
        external_id: row.external_id,
        symbol: row.symbol,
        keyword: row.keyword,
        display_name: row.display_name,
        enabled: row.enabled,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
