//! frps 配置 API
//!
//! 包含 /api/config, /api/config/raw, /api/config/backups 端点

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{ConfigDocument, DeploymentResult};
use crate::error::ApiResult;
use crate::services::{BackupFile, DeployInput};
use crate::state::AppState;

/// 原始配置文本
#[derive(Debug, Serialize, Deserialize)]
pub struct RawConfig {
    pub content: String,
}

/// 创建配置路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/config/raw", get(get_raw_config).post(update_raw_config))
        .route("/api/config/backups", get(list_backups))
}

/// 读取并解析当前配置
///
/// GET /api/config
async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let raw = state.backups.read_live().await?;
    let doc = ConfigDocument::parse(&raw)?;
    Ok(Json(doc.to_json()?))
}

/// 提交结构化配置并重启 frps
///
/// POST /api/config
async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(value): Json<serde_json::Value>,
) -> ApiResult<Response> {
    let result = state.deployer.deploy(DeployInput::Structured(value)).await?;
    Ok(deployment_response(result))
}

/// 读取原始配置文本
///
/// GET /api/config/raw
async fn get_raw_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<RawConfig>> {
    let raw = state.backups.read_live().await?;
    Ok(Json(RawConfig {
        content: String::from_utf8_lossy(&raw).into_owned(),
    }))
}

/// 按原样写入配置文本并重启 frps
///
/// POST /api/config/raw
async fn update_raw_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RawConfig>,
) -> ApiResult<Response> {
    let result = state.deployer.deploy(DeployInput::Raw(req.content)).await?;
    Ok(deployment_response(result))
}

/// 列出配置备份
///
/// GET /api/config/backups
async fn list_backups(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<BackupFile>>> {
    Ok(Json(state.backups.list().await?))
}

/// 成功返回 200，其余终态返回 500，body 均为完整的部署结果
fn deployment_response(result: DeploymentResult) -> Response {
    let status = if result.outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeployOutcome;
    use crate::error::ApiError;
    use crate::infra::supervisor::fake::FakeSupervisor;
    use crate::state::app_state::testing;

    const CONFIG: &str = "bindPort = 7000\n\n[webServer]\nport = 7500\n";

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_config_returns_nested_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frps.toml"), CONFIG).unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let Json(value) = get_config(State(state)).await.unwrap();
        assert_eq!(value["bindPort"], 7000);
        assert_eq!(value["webServer"]["port"], 7500);
    }

    #[tokio::test]
    async fn test_get_config_missing_file_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let err = get_config(State(state)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_structured_update_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frps.toml"), CONFIG).unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let body = serde_json::json!({"bindPort": 7001, "webServer": {"port": 7500}});
        let resp = update_config(State(state), Json(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["outcome"], DeployOutcome::Success.as_str());

        let written = std::fs::read_to_string(dir.path().join("frps.toml")).unwrap();
        assert!(written.contains("bindPort = 7001"));
    }

    #[tokio::test]
    async fn test_failed_restart_is_500_with_result_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frps.toml"), CONFIG).unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::failing("bad config")));

        let req = RawConfig {
            content: "bindPort = 1\n".to_string(),
        };
        let resp = update_raw_config(State(state), Json(req)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(resp).await;
        assert_eq!(json["outcome"], DeployOutcome::RestartFailedRolledBack.as_str());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("frps.toml")).unwrap(),
            CONFIG
        );
    }

    #[tokio::test]
    async fn test_invalid_structured_config_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frps.toml"), CONFIG).unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let err = update_config(State(state), Json(serde_json::json!([1, 2])))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_raw_config_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frps.toml"), CONFIG).unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let Json(raw) = get_raw_config(State(state.clone())).await.unwrap();
        assert_eq!(raw.content, CONFIG);

        let req = RawConfig {
            content: "bindPort = 7002\n".to_string(),
        };
        update_raw_config(State(state.clone()), Json(req)).await.unwrap();

        let Json(backups) = list_backups(State(state)).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].name.starts_with("frps.toml.backup-"));
    }
}
