//! 服务层模块
//!
//! 包含核心业务逻辑：配置快照、frps 控制、部署事务、资源采样

pub mod backup;
pub mod controller;
pub mod credentials;
pub mod deployer;
pub mod restart;
pub mod sampler;

pub use backup::{BackupError, BackupFile, BackupStore, ConfigSnapshot};
pub use controller::{RestartOutcome, ServiceController};
pub use deployer::{ConfigDeployer, DeployError, DeployInput};
pub use restart::RestartManager;
pub use sampler::{ResourceSampler, SystemProbe};
