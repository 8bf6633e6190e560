//! frps dashboard 客户端
//!
//! 通过 frps 的 webServer API (`GET /api/serverinfo`) 获取连接数与累计流量。

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::env::DashboardConfig;

/// dashboard 请求错误
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dashboard returned status {0}")]
    Status(u16),
}

/// frps 的累计统计
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyTotals {
    pub connections: u64,
    pub traffic_in: u64,
    pub traffic_out: u64,
}

/// 代理统计数据源
#[async_trait]
pub trait ProxyStatsSource: Send + Sync {
    async fn totals(&self) -> Result<ProxyTotals, DashboardError>;
}

/// `/api/serverinfo` 响应（新版本为 camelCase，旧版本为 snake_case）
///
/// 字段缺失时解析失败，本轮统计记为不可用
#[derive(Debug, Deserialize)]
struct ServerInfo {
    #[serde(rename = "curConns", alias = "cur_conns")]
    cur_conns: u64,
    #[serde(rename = "totalTrafficIn", alias = "total_traffic_in")]
    total_traffic_in: u64,
    #[serde(rename = "totalTrafficOut", alias = "total_traffic_out")]
    total_traffic_out: u64,
}

pub struct FrpsDashboard {
    client: reqwest::Client,
    config: DashboardConfig,
}

impl FrpsDashboard {
    pub fn new(config: DashboardConfig) -> Result<Self, DashboardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self { client, config })
    }

    fn serverinfo_url(&self) -> String {
        format!("{}/api/serverinfo", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProxyStatsSource for FrpsDashboard {
    async fn totals(&self) -> Result<ProxyTotals, DashboardError> {
        let mut request = self.client.get(self.serverinfo_url());
        if let Some(ref user) = self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DashboardError::Status(response.status().as_u16()));
        }

        let info: ServerInfo = response.json().await?;
        Ok(ProxyTotals {
            connections: info.cur_conns,
            traffic_in: info.total_traffic_in,
            traffic_out: info.total_traffic_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serverinfo_both_casings() {
        let new: ServerInfo = serde_json::from_str(
            r#"{"version":"0.58.0","curConns":3,"totalTrafficIn":1024,"totalTrafficOut":2048}"#,
        )
        .unwrap();
        assert_eq!(new.cur_conns, 3);
        assert_eq!(new.total_traffic_out, 2048);

        let old: ServerInfo =
            serde_json::from_str(r#"{"cur_conns":5,"total_traffic_in":7,"total_traffic_out":9}"#)
                .unwrap();
        assert_eq!(old.cur_conns, 5);
        assert_eq!(old.total_traffic_in, 7);
    }

    #[test]
    fn test_serverinfo_missing_counters_is_an_error() {
        let partial = serde_json::from_str::<ServerInfo>(r#"{"version":"0.58.0","curConns":3}"#);
        assert!(partial.is_err());
    }

    #[test]
    fn test_serverinfo_url() {
        let dashboard = FrpsDashboard::new(DashboardConfig {
            url: "http://127.0.0.1:7500/".to_string(),
            user: None,
            password: None,
        })
        .unwrap();
        assert_eq!(dashboard.serverinfo_url(), "http://127.0.0.1:7500/api/serverinfo");
    }
}
