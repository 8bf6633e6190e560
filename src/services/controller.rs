//! frps 服务控制
//!
//! 包装注入的 `Supervisor`，为每次调用加上超时并把结果归类。不做任何重试，
//! 重试/回滚策略属于 `ConfigDeployer`。

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::env::constants::MAX_LOG_LINES;
use crate::domain::ServiceStatusReport;
use crate::infra::{CommandError, Supervisor, SupervisorOutput};

/// 重启结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "diagnostic", rename_all = "snake_case")]
pub enum RestartOutcome {
    Ok,
    /// 携带进程管理器的原始诊断文本
    Failed(String),
}

pub struct ServiceController {
    supervisor: Arc<dyn Supervisor>,
    timeout: Duration,
}

impl ServiceController {
    pub fn new(supervisor: Arc<dyn Supervisor>, timeout: Duration) -> Self {
        Self {
            supervisor,
            timeout,
        }
    }

    /// 重启服务
    pub async fn restart(&self) -> RestartOutcome {
        tracing::info!("Restarting frps");

        match self.bounded(self.supervisor.restart_service()).await {
            Ok(output) if output.success => {
                tracing::info!("frps restarted");
                RestartOutcome::Ok
            }
            Ok(output) => {
                let diagnostic = output.diagnostic();
                tracing::error!(%diagnostic, "frps restart reported failure");
                RestartOutcome::Failed(if diagnostic.is_empty() {
                    "restart command exited with a non-zero status".to_string()
                } else {
                    diagnostic
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "frps restart could not be executed");
                RestartOutcome::Failed(e.to_string())
            }
        }
    }

    /// 查询服务状态（尽力而为，失败时返回 `success = false`）
    pub async fn status(&self) -> ServiceStatusReport {
        match self.bounded(self.supervisor.service_status()).await {
            Ok(output) if output.success => ServiceStatusReport::ok(output.stdout),
            Ok(output) => ServiceStatusReport::failed(output.diagnostic()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query frps status");
                ServiceStatusReport::failed(e.to_string())
            }
        }
    }

    /// 读取最近 `lines` 行日志，行数被限制在 [1, MAX_LOG_LINES]
    pub async fn recent_logs(&self, lines: u32) -> ServiceStatusReport {
        let lines = lines.clamp(1, MAX_LOG_LINES);
        match self.bounded(self.supervisor.recent_logs(lines)).await {
            Ok(output) if output.success => ServiceStatusReport::ok(output.stdout),
            Ok(output) => ServiceStatusReport::failed(output.diagnostic()),
            Err(e) => {
                tracing::warn!(error = %e, lines, "Failed to fetch frps logs");
                ServiceStatusReport::failed(e.to_string())
            }
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<SupervisorOutput, CommandError>
    where
        F: std::future::Future<Output = Result<SupervisorOutput, CommandError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(CommandError::Timeout(self.timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::supervisor::fake::FakeSupervisor;
    use std::sync::atomic::Ordering;

    fn controller(fake: FakeSupervisor) -> (Arc<FakeSupervisor>, ServiceController) {
        let fake = Arc::new(fake);
        let controller = ServiceController::new(fake.clone(), Duration::from_millis(200));
        (fake, controller)
    }

    #[tokio::test]
    async fn test_restart_ok() {
        let (fake, controller) = controller(FakeSupervisor::succeeding());
        assert_eq!(controller.restart().await, RestartOutcome::Ok);
        assert_eq!(fake.restart_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_failure_carries_diagnostic_without_retry() {
        let (fake, controller) =
            controller(FakeSupervisor::failing("Job for frps.service failed"));

        assert_eq!(
            controller.restart().await,
            RestartOutcome::Failed("Job for frps.service failed".to_string())
        );
        assert_eq!(fake.restart_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_restart_times_out() {
        let (_fake, controller) = controller(FakeSupervisor::hanging());

        match controller.restart().await {
            RestartOutcome::Failed(msg) => assert!(msg.contains("timed out")),
            RestartOutcome::Ok => panic!("hanging restart must not succeed"),
        }
    }

    #[tokio::test]
    async fn test_status_and_logs_are_best_effort() {
        let (fake, controller) = controller(FakeSupervisor::succeeding());

        let status = controller.status().await;
        assert!(status.success);
        assert!(status.text.contains("active (running)"));

        let logs = controller.recent_logs(50_000).await;
        assert!(!logs.success);
        assert!(logs.text.contains("journalctl not found"));
        assert_eq!(fake.last_log_lines.load(Ordering::SeqCst), MAX_LOG_LINES);
    }
}
