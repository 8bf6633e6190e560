//! 配置部署事务
//!
//! 快照 → 写入 → 重启 →（失败时）恢复，每一步都记录在 `DeploymentResult::states` 中：
//!
//! ```text
//! Start ─► Snapshotted ─► Written ─► Verified
//!   │           │            └─► (restart failed) ─► RolledBack | RollbackFailed
//!   └───────────┴─► WriteFailed
//! ```
//!
//! 同一时刻只允许一个部署；并发请求直接返回 `DeployError::InProgress`。
//! 事务在独立任务中执行，调用方（HTTP 请求）被取消时仍会走到终态。

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{
    CodecError, ConfigDocument, DeployOutcome, DeployState, DeploymentResult, SnapshotRef,
};

use super::backup::BackupStore;
use super::controller::{RestartOutcome, ServiceController};

/// 部署输入
#[derive(Clone, Debug)]
pub enum DeployInput {
    /// 结构化配置（前端表单提交的 JSON 对象），经过编解码校验
    Structured(serde_json::Value),
    /// 原始文本，按原样写入
    Raw(String),
}

/// 在任何文件改动之前就被拒绝的部署
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid config: {0}")]
    Parse(#[from] CodecError),

    #[error("a deployment is already in progress")]
    InProgress,

    /// 事务任务异常退出（panic）
    #[error("deployment task failed: {0}")]
    Interrupted(String),
}

pub struct ConfigDeployer {
    backups: Arc<BackupStore>,
    controller: Arc<ServiceController>,
    in_flight: Arc<Mutex<()>>,
}

/// 单次事务的状态记录
struct Transaction {
    states: Vec<DeployState>,
    started_at: chrono::DateTime<Utc>,
    snapshot: Option<SnapshotRef>,
    warning: Option<String>,
}

impl Transaction {
    fn new(warning: Option<String>) -> Self {
        Self {
            states: vec![DeployState::Start],
            started_at: Utc::now(),
            snapshot: None,
            warning,
        }
    }

    fn advance(&mut self, state: DeployState) {
        tracing::debug!(from = ?self.states.last(), to = ?state, "Deployment state transition");
        self.states.push(state);
    }

    fn finish(
        mut self,
        state: DeployState,
        outcome: DeployOutcome,
        message: String,
        errors: FailureDetail,
    ) -> DeploymentResult {
        self.advance(state);
        DeploymentResult {
            outcome,
            message,
            snapshot: self.snapshot,
            write_error: errors.write,
            restart_error: errors.restart,
            rollback_error: errors.rollback,
            warning: self.warning,
            states: self.states,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct FailureDetail {
    write: Option<String>,
    restart: Option<String>,
    rollback: Option<String>,
}

impl ConfigDeployer {
    pub fn new(backups: Arc<BackupStore>, controller: Arc<ServiceController>) -> Self {
        Self {
            backups,
            controller,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// 当前是否有部署在进行
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// 执行一次部署事务
    ///
    /// 只有输入无效或已有部署进行中才返回 `Err`，此时磁盘未被改动；
    /// 其余情况都以 `DeploymentResult` 返回终态。
    pub async fn deploy(
        self: &Arc<Self>,
        input: DeployInput,
    ) -> Result<DeploymentResult, DeployError> {
        let guard = self.in_flight.clone().try_lock_owned().map_err(|_| {
            tracing::warn!("Rejecting deployment: another deployment is in progress");
            DeployError::InProgress
        })?;

        // 锁随任务一起持有，直到事务结束
        let deployer = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            deployer.execute(input).await
        });

        task.await.map_err(|e| {
            tracing::error!(error = %e, "Deployment task did not complete");
            DeployError::Interrupted(e.to_string())
        })?
    }

    async fn execute(&self, input: DeployInput) -> Result<DeploymentResult, DeployError> {
        // Start: 准备写入的字节
        let (content, warning) = match input {
            DeployInput::Structured(value) => {
                let doc = ConfigDocument::from_json(&value)?;
                (doc.serialize()?, None)
            }
            DeployInput::Raw(text) => {
                let warning = ConfigDocument::parse(text.as_bytes()).err().map(|e| {
                    tracing::warn!(error = %e, "Raw config failed TOML pre-check, deploying anyway");
                    e.to_string()
                });
                (text.into_bytes(), warning)
            }
        };

        let path = self.backups.path().display().to_string();
        tracing::info!(path = %path, bytes = content.len(), "Starting config deployment");
        let mut tx = Transaction::new(warning);

        // Snapshotted
        let snapshot = match self.backups.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Snapshot failed, config left untouched");
                return Ok(tx.finish(
                    DeployState::WriteFailed,
                    DeployOutcome::WriteFailed,
                    "Failed to back up the current config; nothing was changed".to_string(),
                    FailureDetail {
                        write: Some(e.to_string()),
                        ..Default::default()
                    },
                ));
            }
        };
        tx.snapshot = Some(snapshot.to_ref());
        tx.advance(DeployState::Snapshotted);

        // Written
        if let Err(e) = self.backups.write_live(&content).await {
            tracing::error!(error = %e, "Writing new config failed, service not restarted");
            return Ok(tx.finish(
                DeployState::WriteFailed,
                DeployOutcome::WriteFailed,
                "Failed to write the new config; the service was not restarted".to_string(),
                FailureDetail {
                    write: Some(e.to_string()),
                    ..Default::default()
                },
            ));
        }
        tx.advance(DeployState::Written);

        // Verified / RolledBack / RollbackFailed
        let restart_error = match self.controller.restart().await {
            RestartOutcome::Ok => {
                tracing::info!(snapshot = %snapshot.id(), "Config deployed and frps restarted");
                return Ok(tx.finish(
                    DeployState::Verified,
                    DeployOutcome::Success,
                    "Config updated and service restarted".to_string(),
                    FailureDetail::default(),
                ));
            }
            RestartOutcome::Failed(diagnostic) => diagnostic,
        };

        match self.backups.restore(&snapshot).await {
            Ok(()) => {
                tracing::warn!(
                    snapshot = %snapshot.id(),
                    restart_error = %restart_error,
                    "Restart failed, previous config restored"
                );
                Ok(tx.finish(
                    DeployState::RolledBack,
                    DeployOutcome::RestartFailedRolledBack,
                    "Service restart failed; the previous config has been restored".to_string(),
                    FailureDetail {
                        restart: Some(restart_error),
                        ..Default::default()
                    },
                ))
            }
            Err(e) => {
                tracing::error!(
                    snapshot = %snapshot.id(),
                    backup = %snapshot.backup_path().display(),
                    restart_error = %restart_error,
                    rollback_error = %e,
                    "Restart failed and rollback failed, manual recovery required"
                );
                Ok(tx.finish(
                    DeployState::RollbackFailed,
                    DeployOutcome::RestartFailedRollbackFailed,
                    format!(
                        "Service restart failed and the previous config could not be restored; \
                         recover manually from {}",
                        snapshot.backup_path().display()
                    ),
                    FailureDetail {
                        restart: Some(restart_error),
                        rollback: Some(e.to_string()),
                        ..Default::default()
                    },
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::supervisor::fake::FakeSupervisor;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const ORIGINAL: &str = "# production\nbindPort = 7000\n\n[webServer]\nport = 7500\n";
    const NEW_RAW: &str = "bindPort = 7001\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        backups: Arc<BackupStore>,
        fake: Arc<FakeSupervisor>,
        deployer: Arc<ConfigDeployer>,
    }

    fn fixture(fake: FakeSupervisor) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps.toml");
        std::fs::write(&path, ORIGINAL).unwrap();
        fixture_at(dir, path, fake)
    }

    fn fixture_at(dir: tempfile::TempDir, path: PathBuf, fake: FakeSupervisor) -> Fixture {
        fixture_with_timeout(dir, path, fake, Duration::from_secs(5))
    }

    fn fixture_with_timeout(
        dir: tempfile::TempDir,
        path: PathBuf,
        fake: FakeSupervisor,
        timeout: Duration,
    ) -> Fixture {
        let fake = Arc::new(fake);
        let backups = Arc::new(BackupStore::new(&path).unwrap());
        let controller = Arc::new(ServiceController::new(fake.clone(), timeout));
        let deployer = Arc::new(ConfigDeployer::new(backups.clone(), controller));
        Fixture {
            _dir: dir,
            path,
            backups,
            fake,
            deployer,
        }
    }

    fn live(f: &Fixture) -> Vec<u8> {
        std::fs::read(&f.path).unwrap()
    }

    #[tokio::test]
    async fn test_success_keeps_snapshot_and_writes_new_content() {
        let f = fixture(FakeSupervisor::succeeding());

        let result = f
            .deployer
            .deploy(DeployInput::Raw(NEW_RAW.to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::Success);
        assert_eq!(
            result.states,
            vec![
                DeployState::Start,
                DeployState::Snapshotted,
                DeployState::Written,
                DeployState::Verified
            ]
        );
        assert_eq!(live(&f), NEW_RAW.as_bytes());

        let snapshot = result.snapshot.unwrap();
        assert_eq!(std::fs::read(&snapshot.backup_path).unwrap(), ORIGINAL.as_bytes());
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn test_structured_input_is_serialized() {
        let f = fixture(FakeSupervisor::succeeding());

        let result = f
            .deployer
            .deploy(DeployInput::Structured(json!({
                "bindPort": 7100,
                "webServer": { "addr": "0.0.0.0", "port": 7600 }
            })))
            .await
            .unwrap();

        assert!(result.outcome.is_success());
        let doc = ConfigDocument::parse(&live(&f)).unwrap();
        assert_eq!(doc.get("webServer", "port"), Some(&toml::Value::Integer(7600)));
        assert_eq!(doc.get("", "bindPort"), Some(&toml::Value::Integer(7100)));
    }

    #[tokio::test]
    async fn test_restart_failure_rolls_back_byte_for_byte() {
        let f = fixture(FakeSupervisor::failing("Job for frps.service failed"));

        let result = f
            .deployer
            .deploy(DeployInput::Raw(NEW_RAW.to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::RestartFailedRolledBack);
        assert_eq!(result.final_state(), DeployState::RolledBack);
        assert_eq!(
            result.restart_error.as_deref(),
            Some("Job for frps.service failed")
        );
        assert!(result.rollback_error.is_none());
        assert!(!result.outcome.needs_manual_recovery());
        assert_eq!(live(&f), ORIGINAL.as_bytes());
    }

    #[tokio::test]
    async fn test_rollback_failure_reports_both_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps.toml");
        std::fs::write(&path, ORIGINAL).unwrap();

        // 重启期间把配置路径替换成非空目录，使恢复失败
        let hook_path = path.clone();
        let fake = FakeSupervisor::failing("frps exited with code 1").with_restart_hook(move || {
            std::fs::remove_file(&hook_path).unwrap();
            std::fs::create_dir(&hook_path).unwrap();
            std::fs::write(hook_path.join("occupied"), b"x").unwrap();
        });
        let f = fixture_at(dir, path, fake);

        let result = f
            .deployer
            .deploy(DeployInput::Raw(NEW_RAW.to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::RestartFailedRollbackFailed);
        assert_eq!(result.final_state(), DeployState::RollbackFailed);
        assert_eq!(result.restart_error.as_deref(), Some("frps exited with code 1"));
        assert!(result.rollback_error.is_some());
        assert!(result.outcome.needs_manual_recovery());

        // 快照仍在，可人工恢复
        let snapshot = result.snapshot.unwrap();
        assert_eq!(std::fs::read(&snapshot.backup_path).unwrap(), ORIGINAL.as_bytes());
        assert!(result.message.contains(&snapshot.backup_path.display().to_string()));
    }

    #[tokio::test]
    async fn test_malformed_structured_input_touches_nothing() {
        let f = fixture(FakeSupervisor::succeeding());

        let err = f
            .deployer
            .deploy(DeployInput::Structured(json!({ "auth": { "token": null } })))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Parse(_)));
        assert_eq!(live(&f), ORIGINAL.as_bytes());
        assert!(f.backups.list().await.unwrap().is_empty());
        assert_eq!(f.fake.restart_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_write_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps.toml");
        let f = fixture_at(dir, path, FakeSupervisor::succeeding());

        let result = f
            .deployer
            .deploy(DeployInput::Raw(NEW_RAW.to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::WriteFailed);
        assert_eq!(result.states, vec![DeployState::Start, DeployState::WriteFailed]);
        assert!(result.snapshot.is_none());
        assert!(result.write_error.is_some());
        assert!(!f.path.exists());
        assert_eq!(f.fake.restart_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raw_precheck_only_warns() {
        let f = fixture(FakeSupervisor::succeeding());

        let result = f
            .deployer
            .deploy(DeployInput::Raw("[webServer\nport = 1\n".to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::Success);
        assert!(result.warning.is_some());
        assert_eq!(live(&f), b"[webServer\nport = 1\n");
    }

    #[tokio::test]
    async fn test_concurrent_deployment_rejected() {
        let f = fixture(FakeSupervisor::succeeding().blocking());

        let first = {
            let deployer = f.deployer.clone();
            tokio::spawn(async move { deployer.deploy(DeployInput::Raw(NEW_RAW.to_string())).await })
        };

        f.fake.entered.notified().await;
        assert!(f.deployer.is_busy());

        let second = f
            .deployer
            .deploy(DeployInput::Raw("bindPort = 9999\n".to_string()))
            .await;
        assert!(matches!(second, Err(DeployError::InProgress)));

        f.fake.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.outcome, DeployOutcome::Success);
        assert_eq!(live(&f), NEW_RAW.as_bytes());
        assert_eq!(f.backups.list().await.unwrap().len(), 1);
        assert!(!f.deployer.is_busy());
    }

    #[tokio::test]
    async fn test_serialized_deployments_produce_distinct_snapshots() {
        let f = fixture(FakeSupervisor::succeeding());

        let mut backups = std::collections::HashSet::new();
        for port in 7001..7011 {
            let result = f
                .deployer
                .deploy(DeployInput::Raw(format!("bindPort = {}\n", port)))
                .await
                .unwrap();
            assert!(backups.insert(result.snapshot.unwrap().backup_path));
        }

        assert_eq!(f.backups.list().await.unwrap().len(), 10);
        for path in &backups {
            assert!(path.exists());
        }
    }

    #[tokio::test]
    async fn test_hanging_restart_times_out_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps.toml");
        std::fs::write(&path, ORIGINAL).unwrap();
        let f = fixture_with_timeout(
            dir,
            path,
            FakeSupervisor::hanging(),
            Duration::from_millis(100),
        );

        let result = f
            .deployer
            .deploy(DeployInput::Raw(NEW_RAW.to_string()))
            .await
            .unwrap();

        assert_eq!(result.outcome, DeployOutcome::RestartFailedRolledBack);
        assert_eq!(
            result.states,
            vec![
                DeployState::Start,
                DeployState::Snapshotted,
                DeployState::Written,
                DeployState::RolledBack
            ]
        );
        assert!(result.restart_error.unwrap().contains("timed out"));
        assert_eq!(live(&f), ORIGINAL.as_bytes());
    }

    #[tokio::test]
    async fn test_cancelled_caller_still_rolls_back() {
        let f = fixture(FakeSupervisor::failing("boom").blocking());

        let caller = {
            let deployer = f.deployer.clone();
            tokio::spawn(async move { deployer.deploy(DeployInput::Raw(NEW_RAW.to_string())).await })
        };

        // 重启进行中时请求被丢弃
        f.fake.entered.notified().await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(f.deployer.is_busy());

        f.fake.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.deployer.is_busy() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(live(&f), ORIGINAL.as_bytes());
        assert_eq!(f.fake.restart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.backups.list().await.unwrap().len(), 1);
    }
}
