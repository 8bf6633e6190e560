//! 资源监控 API
//!
//! 包含 /api/monitoring, /api/monitoring/history 端点。
//! 只读取采样器已发布的值，不会在请求路径上做任何测量。

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::ResourceSample;
use crate::state::AppState;

/// 监控数据（字段名与前端保持一致，不可用的指标为 null）
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringResponse {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub connections: Option<u64>,
    pub current_traffic: Option<u64>,
    pub inbound: Option<u64>,
    pub outbound: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ResourceSample> for MonitoringResponse {
    fn from(sample: &ResourceSample) -> Self {
        Self {
            cpu: sample.cpu_percent,
            memory: sample.memory_percent,
            connections: sample.proxy.connections,
            current_traffic: sample.proxy.current_traffic,
            inbound: sample.proxy.inbound,
            outbound: sample.proxy.outbound,
            timestamp: sample.timestamp,
        }
    }
}

/// 创建监控路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/monitoring", get(get_monitoring))
        .route("/api/monitoring/history", get(get_history))
}

/// 最近一次采样
///
/// GET /api/monitoring
async fn get_monitoring(State(state): State<Arc<AppState>>) -> Json<MonitoringResponse> {
    let sample = state.sampler.current_sample();
    Json(MonitoringResponse::from(sample.as_ref()))
}

/// 采样历史，从旧到新
///
/// GET /api/monitoring/history
async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<MonitoringResponse>> {
    let history = state.sampler.history().await;
    Json(history.iter().map(|s| MonitoringResponse::from(s.as_ref())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::supervisor::fake::FakeSupervisor;
    use crate::state::app_state::testing;

    #[tokio::test]
    async fn test_monitoring_before_first_sample_is_all_null() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let Json(resp) = get_monitoring(State(state)).await;
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["cpu"].is_null());
        assert!(json["memory"].is_null());
        assert!(json["currentTraffic"].is_null());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_monitoring_reflects_published_sample() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), Arc::new(FakeSupervisor::succeeding()));

        let sample = state.sampler.sample_once().await;
        state.sampler.publish(sample).await;

        let Json(resp) = get_monitoring(State(state.clone())).await;
        assert_eq!(resp.cpu, None);
        assert_eq!(resp.memory, Some(75.0));
        assert_eq!(resp.connections, None);

        let Json(history) = get_history(State(state)).await;
        assert_eq!(history, vec![resp]);
    }
}
