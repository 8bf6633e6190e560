//! 面板进程自重启
//!
//! 修改管理员密码后需要重新加载 .env：
//! - Unix: 使用 exec 替换当前进程
//! - 其它平台: 启动新进程后退出
//!
//! 新进程不继承 `ADMIN_PASSWORD`，dotenvy 不会覆盖已存在的变量，
//! 否则启动时读到的仍是旧密码。

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// 启动后从 .env 重新读取的变量
const RELOADED_VARS: &[&str] = &["ADMIN_PASSWORD"];

/// 重启错误类型
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("Failed to execute command: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 统一的重启管理器
pub struct RestartManager;

impl RestartManager {
    /// 在 `delay` 之后重启当前进程
    ///
    /// 延迟保证当前请求的响应能先发送出去
    pub fn schedule_self_restart(delay: Duration) {
        tracing::info!(?delay, "Scheduling panel restart");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let binary = match std::env::current_exe() {
                Ok(binary) => binary,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot locate current executable, restart aborted");
                    return;
                }
            };

            if let Err(e) = Self::restart_process(&binary) {
                tracing::error!(error = %e, "Panel restart failed");
            }
        });
    }

    /// 以相同参数重新启动自身的命令
    fn restart_command(binary: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(std::env::args().skip(1));
        for var in RELOADED_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Unix: exec 不会返回，除非出错
    #[cfg(unix)]
    fn restart_process(binary: &Path) -> Result<(), RestartError> {
        use std::os::unix::process::CommandExt;

        tracing::info!(binary = %binary.display(), "Restarting via exec");

        let err = Self::restart_command(binary).exec();
        Err(RestartError::CommandFailed(format!("exec failed: {}", err)))
    }

    /// 其它平台: 启动独立的新进程后退出当前进程
    #[cfg(not(unix))]
    fn restart_process(binary: &Path) -> Result<(), RestartError> {
        tracing::info!(binary = %binary.display(), "Restarting via spawn + exit");

        Self::restart_command(binary)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        std::process::exit(0);
    }
}
