use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crystal_core::{day_window, previous_day_window, CrawlWindow, Platform, PlatformSelector};
use crystal_scheduler::{SchedulerError, TriggerKind};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

/// `platforms` accepts the literal string `"all"` or an explicit name list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum PlatformsField {
    All(String),
    Named(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub(super) struct CrawlRequest {
    pub platforms: PlatformsField,
    pub date: Option<NaiveDate>,
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct DetachedRunData {
    run_id: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: Uuid,
    trigger_kind: String,
    status: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    error_summary: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunPlatformItem {
    platform: String,
    status: String,
    items_seen: i32,
    items_saved: i32,
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunDetail {
    #[serde(flatten)]
    run: RunItem,
    platforms: Vec<RunPlatformItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct CancelData {
    run_id: Uuid,
    cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

fn parse_selector(req_id: &str, field: &PlatformsField) -> Result<PlatformSelector, ApiError> {
    match field {
        PlatformsField::All(s) if s == "all" => Ok(PlatformSelector::All),
        PlatformsField::All(s) => Err(ApiError::new(
            req_id.to_owned(),
            "validation_error",
            format!("platforms must be \"all\" or a list of names, got \"{s}\""),
        )),
        PlatformsField::Named(names) => {
            if names.is_empty() {
                return Err(ApiError::new(
                    req_id.to_owned(),
                    "validation_error",
                    "platforms list must not be empty",
                ));
            }
            let mut platforms = Vec::with_capacity(names.len());
            for name in names {
                let platform: Platform = name.parse().map_err(|_| {
                    ApiError::new(
                        req_id.to_owned(),
                        "validation_error",
                        format!("unknown platform: {name}"),
                    )
                })?;
                platforms.push(platform);
            }
            Ok(PlatformSelector::Named(platforms))
        }
    }
}

fn request_window(date: Option<NaiveDate>) -> CrawlWindow {
    date.map_or_else(|| previous_day_window(Utc::now()), day_window)
}

pub(super) async fn trigger_crawl(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CrawlRequest>,
) -> Result<Response, ApiError> {
    let selector = parse_selector(&req_id.0, &body.platforms)?;
    let window = request_window(body.date);

    if !body.wait.unwrap_or(true) {
        let handle = state
            .crawl
            .run_detached(&selector, TriggerKind::Manual, window)
            .await
            .map_err(|e| match e {
                SchedulerError::AlreadyRunning { .. } => {
                    ApiError::new(req_id.0.clone(), "already_running", e.to_string())
                }
                SchedulerError::Db(db) => map_db_error(req_id.0.clone(), &db),
            })?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(ApiResponse {
                data: DetachedRunData {
                    run_id: handle.public_id,
                    status: "running",
                },
                meta: ResponseMeta::new(req_id.0),
            }),
        )
            .into_response());
    }

    let summary = state
        .crawl
        .run(&selector, TriggerKind::Manual, window)
        .await
        .map_err(|e| match e {
            SchedulerError::Db(db) => map_db_error(req_id.0.clone(), &db),
            other => ApiError::new(req_id.0.clone(), "internal_error", other.to_string()),
        })?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    })
    .into_response())
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunItem>>>, ApiError> {
    let rows = crystal_db::list_crawl_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(run_item).collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunDetail>>, ApiError> {
    let run = crystal_db::get_crawl_run_by_public_id(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let platforms = crystal_db::list_crawl_run_platforms(&state.pool, run.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let detail = RunDetail {
        run: run_item(run),
        platforms: platforms
            .into_iter()
            .map(|row| RunPlatformItem {
                platform: row.platform,
                status: row.status,
                items_seen: row.items_seen,
                items_saved: row.items_saved,
                error_message: row.error_message,
            })
            .collect(),
    };

    Ok(Json(ApiResponse {
        data: detail,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn cancel_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CancelData>>, ApiError> {
    if !state.crawl.cancel_run(public_id) {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "run is not active",
        ));
    }

    Ok(Json(ApiResponse {
        data: CancelData {
            run_id: public_id,
            cancelled: true,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn run_item(row: crystal_db::CrawlRunRow) -> RunItem {
    RunItem {
        run_id: row.public_id,
        trigger_kind: row.trigger_kind,
        status: row.status,
        window_start: row.window_start,
        window_end: row.window_end,
        started_at: row.started_at,
        ended_at: row.ended_at,
        error_summary: row.error_summary,
        created_at: row.created_at,
    }
}
