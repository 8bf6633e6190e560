//! 服务状态与资源监控领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 服务状态/日志查询结果
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatusReport {
    pub success: bool,
    pub text: String,
}

impl ServiceStatusReport {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// frps 连接与流量统计
///
/// 字段为 `None` 表示本轮无法获取（未配置 dashboard 或请求失败）
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ProxyStats {
    pub connections: Option<u64>,
    /// 自上次采样以来的吞吐（字节/秒）
    pub current_traffic: Option<u64>,
    /// 累计入站字节
    pub inbound: Option<u64>,
    /// 累计出站字节
    pub outbound: Option<u64>,
}

impl ProxyStats {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// 一次资源采样
#[derive(Clone, Debug, Serialize)]
pub struct ResourceSample {
    /// CPU 使用率 [0, 100]
    pub cpu_percent: Option<f64>,
    /// 内存使用率 [0, 100]
    pub memory_percent: Option<f64>,
    pub proxy: ProxyStats,
    pub timestamp: DateTime<Utc>,
}

impl ResourceSample {
    /// 首轮采样完成前的占位值
    pub fn empty() -> Self {
        Self {
            cpu_percent: None,
            memory_percent: None,
            proxy: ProxyStats::unavailable(),
            timestamp: Utc::now(),
        }
    }
}
