//! 进程管理器（systemd）接口
//!
//! `Supervisor` 是对外部进程管理器的最小抽象：重启、查询状态、读取最近日志。
//! 生产环境使用 `SystemdSupervisor`（systemctl + journalctl），测试中注入假实现。

use async_trait::async_trait;
use std::time::Duration;

use super::command::{CommandError, CommandRunner};

/// 一次外部调用的输出
#[derive(Clone, Debug, Default)]
pub struct SupervisorOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SupervisorOutput {
    pub fn from_output(output: &std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// 诊断文本：优先 stderr，其次 stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// 外部进程管理器能力
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn restart_service(&self) -> Result<SupervisorOutput, CommandError>;

    async fn service_status(&self) -> Result<SupervisorOutput, CommandError>;

    async fn recent_logs(&self, lines: u32) -> Result<SupervisorOutput, CommandError>;
}

/// 基于 systemctl / journalctl 的实现
pub struct SystemdSupervisor {
    unit: String,
    timeout: Duration,
}

impl SystemdSupervisor {
    pub fn new(unit: impl Into<String>, timeout: Duration) -> Self {
        Self {
            unit: unit.into(),
            timeout,
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<SupervisorOutput, CommandError> {
        tracing::debug!(program, ?args, "Invoking supervisor");
        let output = CommandRunner::run_simple(program, args, None, self.timeout).await?;
        Ok(SupervisorOutput::from_output(&output))
    }
}

#[async_trait]
impl Supervisor for SystemdSupervisor {
    async fn restart_service(&self) -> Result<SupervisorOutput, CommandError> {
        self.run("systemctl", &["restart", &self.unit]).await
    }

    async fn service_status(&self) -> Result<SupervisorOutput, CommandError> {
        self.run("systemctl", &["status", &self.unit, "--no-pager"])
            .await
    }

    async fn recent_logs(&self, lines: u32) -> Result<SupervisorOutput, CommandError> {
        let lines = lines.to_string();
        self.run("journalctl", &["-u", &self.unit, "-n", &lines, "--no-pager"])
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = SupervisorOutput {
            success: false,
            stdout: "stdout text".to_string(),
            stderr: "Job for frps.service failed.\n".to_string(),
        };
        assert_eq!(output.diagnostic(), "Job for frps.service failed.");

        let output = SupervisorOutput {
            success: false,
            stdout: " only stdout ".to_string(),
            stderr: "  ".to_string(),
        };
        assert_eq!(output.diagnostic(), "only stdout");
    }
}
