use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use crate::models::{LogLevel, RequestLog};
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
    /// `info`, `warn` or `error`; anything else lists every level
    pub level: Option<String>,
}

#[derive(Serialize)]
pub struct LogsResponse {
    pub logs: Vec<RequestLog>,
}

/// `GET /admin/logs`: persisted request log, newest first
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let level = query.level.as_deref().and_then(|l| l.parse::<LogLevel>().ok());

    let logs = state.storage.list_logs(level, None, limit).await?;
    Ok(Json(LogsResponse { logs }))
}

/// `GET /admin/download/db`: a consistent copy of the SQLite database
pub async fn download_db(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .storage
        .snapshot()
        .await?
        .ok_or(ApiError::NotFound("Database download requires the SQLite backend"))?;
    tracing::info!(bytes = bytes.len(), "database downloaded");

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.sqlite3"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"app.db\""),
        ],
        bytes,
    ))
}
