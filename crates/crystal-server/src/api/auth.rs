use axum::{
    extract::State,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crystal_core::Platform;
use crystal_session::{SessionError, SessionHealth};

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

const DEFAULT_MANUAL_LOGIN_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
pub(super) struct ManualLoginRequest {
    pub platform: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ManualLoginData {
    platform: Platform,
    username: Option<String>,
    logged_in: bool,
}

pub(super) async fn auth_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<SessionHealth>>>, ApiError> {
    let data = state
        .sessions
        .status()
        .await
        .map_err(|e| map_session_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn manual_login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ManualLoginRequest>,
) -> Result<Json<ApiResponse<ManualLoginData>>, ApiError> {
    let platform: Platform = body.platform.parse().map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("unknown platform: {}", body.platform),
        )
    })?;
    let timeout_secs = body
        .timeout_secs
        .unwrap_or(DEFAULT_MANUAL_LOGIN_TIMEOUT_SECS);

    let session = state
        .sessions
        .manual_login(platform, timeout_secs)
        .await
        .map_err(|e| map_session_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ManualLoginData {
            platform: session.platform,
            username: session.username,
            logged_in: true,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_session_error(request_id: String, error: &SessionError) -> ApiError {
    match error {
        SessionError::LoginTimeout { .. } => {
            ApiError::new(request_id, "login_timeout", error.to_string())
        }
        SessionError::LoginFailed { .. }
        | SessionError::NoCredentials { .. }
        | SessionError::AutomationUnavailable { .. } => {
            ApiError::new(request_id, "login_failed", error.to_string())
        }
        SessionError::Db(db) => super::map_db_error(request_id, db),
    }
}
