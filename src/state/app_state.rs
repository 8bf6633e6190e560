//! 应用状态

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{AuthConfig, EnvConfig};
use crate::infra::{FrpsDashboard, ProxyStatsSource, Supervisor, SystemdSupervisor};
use crate::services::sampler::HostProbe;
use crate::services::{BackupStore, ConfigDeployer, ResourceSampler, ServiceController, SystemProbe};

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// 环境配置
    pub config: EnvConfig,
    /// 当前生效的面板凭据（修改密码后立即替换）
    pub credentials: RwLock<AuthConfig>,
    /// 后台任务的关闭信号
    pub shutdown: CancellationToken,

    // ========== frps 管理 ==========
    /// 配置文件快照
    pub backups: Arc<BackupStore>,
    /// frps 服务控制
    pub controller: Arc<ServiceController>,
    /// 配置部署事务
    pub deployer: Arc<ConfigDeployer>,

    // ========== 监控 ==========
    /// 资源采样器
    pub sampler: Arc<ResourceSampler>,
}

impl AppState {
    /// 按环境配置创建应用状态（systemd + /proc + 可选的 frps dashboard）
    pub fn new(config: EnvConfig) -> anyhow::Result<Self> {
        tracing::info!(
            port = config.port,
            config_path = %config.frps.config_path.display(),
            service = %config.frps.service,
            env_file = %config.env_file.display(),
            public_dir = %config.public_dir.display(),
            dashboard = config.monitor.dashboard.is_some(),
            "Loaded configuration"
        );

        let supervisor: Arc<dyn Supervisor> = Arc::new(SystemdSupervisor::new(
            config.frps.service.clone(),
            config.frps.supervisor_timeout(),
        ));

        let proxy: Option<Arc<dyn ProxyStatsSource>> = match &config.monitor.dashboard {
            Some(dashboard) => {
                let client = FrpsDashboard::new(dashboard.clone())
                    .context("failed to build frps dashboard client")?;
                Some(Arc::new(client))
            }
            None => {
                tracing::info!("FRPS_DASHBOARD_URL not set, connection and traffic stats disabled");
                None
            }
        };

        Self::with_components(config, supervisor, Arc::new(SystemProbe::new()), proxy)
    }

    /// 使用给定的进程管理器和指标来源组装状态
    pub fn with_components(
        config: EnvConfig,
        supervisor: Arc<dyn Supervisor>,
        probe: Arc<dyn HostProbe>,
        proxy: Option<Arc<dyn ProxyStatsSource>>,
    ) -> anyhow::Result<Self> {
        let backups = Arc::new(
            BackupStore::new(config.frps.config_path.clone())
                .context("invalid FRPS_CONFIG_PATH")?,
        );
        let controller = Arc::new(ServiceController::new(
            supervisor,
            config.frps.supervisor_timeout(),
        ));
        let deployer = Arc::new(ConfigDeployer::new(backups.clone(), controller.clone()));
        let sampler = Arc::new(ResourceSampler::new(probe, proxy, &config.monitor));

        Ok(Self {
            credentials: RwLock::new(config.auth.clone()),
            shutdown: CancellationToken::new(),
            backups,
            controller,
            deployer,
            sampler,
            config,
        })
    }

    /// 启动后台采样任务
    pub fn spawn_background_tasks(&self) {
        let sampler = self.sampler.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            sampler.run(shutdown).await;
        });
    }
}
