//! 面板管理 API
//!
//! 包含 /api/admin/password 端点

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiResult;
use crate::services::credentials::update_env_password;
use crate::services::RestartManager;
use crate::state::AppState;

/// 响应发出后到进程重启之间的延迟
const RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResponse {
    pub success: bool,
    pub message: String,
}

/// 创建管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/admin/password", post(update_password))
}

/// 修改管理员密码，随后重启面板
///
/// POST /api/admin/password
async fn update_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordRequest>,
) -> ApiResult<Json<PasswordResponse>> {
    change_password(&state, &req.password).await?;
    RestartManager::schedule_self_restart(RESTART_DELAY);

    Ok(Json(PasswordResponse {
        success: true,
        message: "Password updated successfully. Server will restart.".to_string(),
    }))
}

/// 写入 .env 并立即替换内存中的凭据
async fn change_password(state: &AppState, password: &str) -> ApiResult<()> {
    update_env_password(&state.config.env_file, password).await?;
    state.credentials.write().await.password = password.to_string();
    Ok(())
}
