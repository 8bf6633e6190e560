//! 配置文件快照与恢复
//!
//! 快照写在配置文件旁边：`frps.toml.backup-20240101T120000123456Z-0007`，
//! 使用 `create_new` 创建，永远不会覆盖已有文件；快照不会被自动清理。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::SnapshotRef;

/// 进程内单调递增的序号，同一微秒内的快照也不会冲突
static SNAPSHOT_SEQ: AtomicU64 = AtomicU64::new(0);

/// 快照/恢复错误
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("config path {0} has no file name")]
    InvalidPath(PathBuf),
}

/// 配置文件的不可变快照
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    id: String,
    source: PathBuf,
    backup_path: PathBuf,
    created_at: DateTime<Utc>,
    content: Arc<[u8]>,
}

impl ConfigSnapshot {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn to_ref(&self) -> SnapshotRef {
        SnapshotRef {
            id: self.id.clone(),
            backup_path: self.backup_path.clone(),
            created_at: self.created_at,
        }
    }
}

/// 磁盘上的备份文件
#[derive(Clone, Debug, Serialize)]
pub struct BackupFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// 单个配置文件的快照存储
pub struct BackupStore {
    path: PathBuf,
    file_name: String,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BackupError::InvalidPath(path.clone()))?;
        Ok(Self { path, file_name })
    }

    /// 被管理的配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取当前配置
    pub async fn read_live(&self) -> Result<Vec<u8>, BackupError> {
        fs::read(&self.path).await.map_err(|source| BackupError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// 对当前配置做快照
    pub async fn snapshot(&self) -> Result<ConfigSnapshot, BackupError> {
        let content: Arc<[u8]> = self.read_live().await?.into();

        loop {
            let created_at = Utc::now();
            let seq = SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed);
            let id = format!("{}-{:04}", created_at.format("%Y%m%dT%H%M%S%6fZ"), seq);
            let backup_path = self.sibling(&format!("{}.backup-{}", self.file_name, id));

            match write_new(&backup_path, &content).await {
                Ok(()) => {
                    tracing::info!(
                        snapshot = %id,
                        backup = %backup_path.display(),
                        bytes = content.len(),
                        "Config snapshot created"
                    );
                    return Ok(ConfigSnapshot {
                        id,
                        source: self.path.clone(),
                        backup_path,
                        created_at,
                        content,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(backup = %backup_path.display(), "Snapshot name taken, retrying");
                }
                Err(source) => {
                    return Err(BackupError::Write {
                        path: backup_path,
                        source,
                    })
                }
            }
        }
    }

    /// 把快照内容写回原路径
    pub async fn restore(&self, snapshot: &ConfigSnapshot) -> Result<(), BackupError> {
        write_atomic(&snapshot.source, &snapshot.content).await?;
        tracing::info!(
            snapshot = %snapshot.id,
            path = %snapshot.source.display(),
            "Config restored from snapshot"
        );
        Ok(())
    }

    /// 原子替换当前配置（临时文件 + rename）
    pub async fn write_live(&self, content: &[u8]) -> Result<(), BackupError> {
        write_atomic(&self.path, content).await
    }

    /// 列出当前配置的所有备份，按名称（即时间）排序
    pub async fn list(&self) -> Result<Vec<BackupFile>, BackupError> {
        let dir = self.sibling("");
        let read_dir_err = |source| BackupError::Read {
            path: dir.clone(),
            source,
        };

        let prefix = format!("{}.backup-", self.file_name);
        let mut entries = fs::read_dir(&dir).await.map_err(read_dir_err)?;
        let mut backups = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&prefix) {
                continue;
            }
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            backups.push(BackupFile {
                name,
                path: entry.path(),
                size,
            });
        }

        backups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(backups)
    }

    fn sibling(&self, name: &str) -> PathBuf {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if name.is_empty() {
            dir
        } else {
            dir.join(name)
        }
    }
}

/// 创建新文件并写入，失败时不留下半个文件
async fn write_new(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let result = async {
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await;

    if result.is_err() {
        drop(file);
        let _ = fs::remove_file(path).await;
    }
    result
}

/// 写入同目录临时文件后 rename 覆盖目标，保留原文件权限
async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), BackupError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::InvalidPath(path.to_path_buf()))?;
    let seq = SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_file_name(format!(".{}.tmp-{}-{}", file_name, std::process::id(), seq));

    let permissions = fs::metadata(path).await.ok().map(|m| m.permissions());

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);

        if let Some(permissions) = permissions {
            fs::set_permissions(&tmp, permissions).await?;
        }
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(BackupError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
