//! frps-panel - frps 管理面板
//!
//! 库入口：事务化的配置部署、服务状态查询与资源监控

pub mod error;
pub mod middleware;
pub mod infra;
pub mod domain;
pub mod config;
pub mod state;
pub mod api;
pub mod services;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::config::EnvConfig;
use crate::state::AppState;

/// 命令行参数带来的运行时覆盖
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖 PORT 环境变量
    pub port_override: Option<u16>,
}

/// 加载配置、启动采样器并运行 HTTP 服务，直到收到 Ctrl+C
pub async fn run(runtime: RuntimeConfig) -> anyhow::Result<()> {
    let mut config = EnvConfig::from_env();
    if let Some(port) = runtime.port_override {
        config.port = port;
    }

    let state = Arc::new(AppState::new(config)?);
    state.spawn_background_tasks();

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, version = VERSION, "frps panel listening");

    let shutdown = state.shutdown.clone();
    let app = api::router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
