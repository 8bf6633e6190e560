//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// 面板登录凭据
    pub auth: AuthConfig,
    /// 凭据所在的 .env 文件
    pub env_file: PathBuf,
    /// 静态资源目录
    pub public_dir: PathBuf,
    /// 被管理的 frps 服务
    pub frps: FrpsConfig,
    /// 资源监控
    pub monitor: MonitorConfig,
}

/// 面板登录凭据（Basic Auth）
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub user: String,
    pub password: String,
}

/// frps 服务配置
#[derive(Clone, Debug)]
pub struct FrpsConfig {
    /// frps.toml 路径
    pub config_path: PathBuf,
    /// systemd unit 名称
    pub service: String,
    /// 每次调用 systemctl/journalctl 的超时（秒）
    pub supervisor_timeout_secs: u64,
}

impl FrpsConfig {
    pub fn supervisor_timeout(&self) -> Duration {
        Duration::from_secs(self.supervisor_timeout_secs)
    }
}

/// frps dashboard (webServer) 访问配置
#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// 资源监控配置
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// 采样周期（毫秒）
    pub interval_ms: u64,
    /// CPU 两次计数读取之间的间隔（毫秒）
    pub cpu_window_ms: u64,
    /// 保留的历史采样数
    pub history: usize,
    /// 未配置时连接数/流量标记为不可用
    pub dashboard: Option<DashboardConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::SAMPLE_INTERVAL_MS,
            cpu_window_ms: constants::CPU_SAMPLE_WINDOW_MS,
            history: constants::MONITOR_HISTORY,
            dashboard: None,
        }
    }
}

impl EnvConfig {
    /// 从环境变量加载配置
    ///
    /// 调用前应先通过 `dotenvy` 加载 .env
    pub fn from_env() -> Self {
        let port = parse_var("PORT").unwrap_or(3000);

        let auth = AuthConfig {
            user: env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string()),
            password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| {
                warn!("ADMIN_PASSWORD not set, falling back to the default password");
                "admin".to_string()
            }),
        };

        let env_file = env::var("ENV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".env"));
        let public_dir = env::var("PUBLIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("public"));

        Self {
            port,
            auth,
            env_file,
            public_dir,
            frps: FrpsConfig::from_env(),
            monitor: MonitorConfig::from_env(),
        }
    }
}

impl FrpsConfig {
    pub fn from_env() -> Self {
        let config_path = env::var("FRPS_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(constants::DEFAULT_CONFIG_PATH));
        let service = env::var("FRPS_SERVICE").unwrap_or_else(|_| "frps".to_string());
        let supervisor_timeout_secs = parse_var("SUPERVISOR_TIMEOUT_SECS")
            .unwrap_or(constants::SUPERVISOR_TIMEOUT_SECS);

        Self {
            config_path,
            service,
            supervisor_timeout_secs,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let dashboard = env::var("FRPS_DASHBOARD_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|url| DashboardConfig {
                url,
                user: env::var("FRPS_DASHBOARD_USER").ok().filter(|s| !s.is_empty()),
                password: env::var("FRPS_DASHBOARD_PWD").ok().filter(|s| !s.is_empty()),
            });

        Self {
            interval_ms: parse_var("SAMPLE_INTERVAL_MS")
                .filter(|v| *v > 0)
                .unwrap_or(constants::SAMPLE_INTERVAL_MS),
            cpu_window_ms: parse_var("CPU_SAMPLE_WINDOW_MS")
                .unwrap_or(constants::CPU_SAMPLE_WINDOW_MS),
            history: parse_var("MONITOR_HISTORY")
                .filter(|v| *v > 0)
                .unwrap_or(constants::MONITOR_HISTORY),
            dashboard,
        }
    }
}

/// 读取并解析环境变量，解析失败时记录警告
fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// 常量
pub mod constants {
    /// frps 配置默认路径
    pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/frp/frps.toml";

    /// systemctl/journalctl 调用超时（秒）
    pub const SUPERVISOR_TIMEOUT_SECS: u64 = 30;

    /// 资源采样周期（毫秒）
    pub const SAMPLE_INTERVAL_MS: u64 = 2000;

    /// CPU 计数读取间隔（毫秒）
    pub const CPU_SAMPLE_WINDOW_MS: u64 = 100;

    /// 历史采样保留数量
    pub const MONITOR_HISTORY: usize = 30;

    /// 默认返回的日志行数
    pub const DEFAULT_LOG_LINES: u32 = 50;

    /// 日志行数上限
    pub const MAX_LOG_LINES: u32 = 1000;

    /// 管理员密码最小长度
    pub const MIN_PASSWORD_LEN: usize = 6;

    /// Basic Auth realm
    pub const AUTH_REALM: &str = "FRP Management Panel";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
