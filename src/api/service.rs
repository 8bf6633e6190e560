//! frps 服务状态 API
//!
//! 包含 /api/status, /api/logs 端点

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::env::constants::DEFAULT_LOG_LINES;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<u32>,
}

/// 创建服务状态路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/logs", get(get_logs))
}

/// systemctl status 输出
///
/// GET /api/status
async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let report = state.controller.status().await;
    if !report.success {
        return Err(ApiError::internal(format!(
            "Failed to get status: {}",
            report.text
        )));
    }
    Ok(Json(StatusResponse {
        status: report.text,
    }))
}

/// journalctl 最近日志
///
/// GET /api/logs?lines=50
async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    let report = state.controller.recent_logs(lines).await;
    if !report.success {
        return Err(ApiError::internal(format!(
            "Failed to get logs: {}",
            report.text
        )));
    }
    Ok(Json(LogsResponse { logs: report.text }))
}
