//! 配置部署相关领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// 部署事务状态
///
/// `Start → Snapshotted → Written → Verified`，失败时分支到 `RolledBack` / `RollbackFailed`，
/// 快照或写入失败终止于 `WriteFailed`。
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Start,
    Snapshotted,
    Written,
    Verified,
    RolledBack,
    RollbackFailed,
    WriteFailed,
}

impl DeployState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployState::Verified
                | DeployState::RolledBack
                | DeployState::RollbackFailed
                | DeployState::WriteFailed
        )
    }
}

/// 部署结果
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployOutcome {
    /// 新配置已生效
    Success,
    /// 重启失败，旧配置已恢复
    RestartFailedRolledBack,
    /// 重启失败且恢复失败，需要人工介入
    RestartFailedRollbackFailed,
    /// 快照或写入失败，服务未被重启
    WriteFailed,
}

impl DeployOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployOutcome::Success => "success",
            DeployOutcome::RestartFailedRolledBack => "restart_failed_rolled_back",
            DeployOutcome::RestartFailedRollbackFailed => "restart_failed_rollback_failed",
            DeployOutcome::WriteFailed => "write_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Success)
    }

    /// 磁盘上的配置可能与正在运行的服务不一致
    pub fn needs_manual_recovery(&self) -> bool {
        matches!(self, DeployOutcome::RestartFailedRollbackFailed)
    }
}

/// 快照引用（返回给调用方，便于人工恢复）
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotRef {
    pub id: String,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// 一次部署的完整结果
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentResult {
    pub outcome: DeployOutcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
    /// 原始文本未通过 TOML 预检（仅警告，不阻止部署）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// 状态机轨迹
    pub states: Vec<DeployState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn final_state(&self) -> DeployState {
        self.states.last().copied().unwrap_or(DeployState::Start)
    }
}
