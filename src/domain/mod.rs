//! 领域模型
//!
//! 配置文档、部署结果、服务状态与资源采样

pub mod config_doc;
pub mod deploy;
pub mod system;

pub use config_doc::{CodecError, ConfigDocument, Section, ROOT_SECTION};
pub use deploy::{DeployOutcome, DeployState, DeploymentResult, SnapshotRef};
pub use system::{ProxyStats, ResourceSample, ServiceStatusReport};
