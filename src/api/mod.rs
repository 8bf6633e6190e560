//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod admin;
pub mod config;
pub mod monitoring;
pub mod service;

use axum::{middleware::from_extractor_with_state, Router};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::middleware::RequireBasicAuth;
use crate::state::AppState;

/// 构建完整的 API 路由
///
/// 所有接口以及静态页面都需要 Basic Auth
pub fn router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.config.public_dir);

    Router::new()
        // frps 配置
        .merge(config::router())
        // 服务状态与日志
        .merge(service::router())
        // 资源监控
        .merge(monitoring::router())
        // 面板管理
        .merge(admin::router())
        // 前端静态资源
        .fallback_service(assets)
        // Middleware
        .layer(from_extractor_with_state::<RequireBasicAuth, _>(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
