//! 命令执行器
//!
//! 提供统一的外部命令执行接口，支持：
//! - 超时控制（超时后子进程被杀掉）
//! - stdout/stderr 分离

use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout(d) => write!(f, "Command timed out after {:?}", d),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) => Some(e),
            CommandError::Timeout(_) => None,
        }
    }
}

impl CommandRunner {
    /// 执行简单命令并收集输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录（None 时沿用当前目录）
    /// * `timeout` - 超时时间
    pub async fn run_simple(
        program: &str,
        args: &[&str],
        work_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(CommandError::SpawnFailed),
            Err(_) => {
                warn!(program, ?args, ?timeout, "Command timed out, killing process");
                Err(CommandError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_run_simple_success() {
        let result = CommandRunner::run_simple(
            "echo",
            &["hello"],
            Some(&PathBuf::from("/tmp")),
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_simple_not_found() {
        let result =
            CommandRunner::run_simple("nonexistent_command_12345", &[], None, Duration::from_secs(5))
                .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_simple_timeout() {
        let result =
            CommandRunner::run_simple("sleep", &["5"], None, Duration::from_millis(100)).await;

        assert!(matches!(result, Err(CommandError::Timeout(_))));
    }
}
