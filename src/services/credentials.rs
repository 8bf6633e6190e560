//! 管理员密码更新
//!
//! 改写 .env 中的 `ADMIN_PASSWORD=` 行（不存在则追加），其它行保持原样。
//! 写入通过临时文件 + rename 完成。

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::config::env::constants::MIN_PASSWORD_LEN;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    TooShort,

    #[error("password must not contain line breaks or single quotes")]
    InvalidCharacters,

    #[error("failed to update {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::TooShort);
    }
    // 值以单引号写入 .env，单引号内 dotenvy 不做 `$` 替换
    if password.contains(['\n', '\r', '\'']) {
        return Err(CredentialError::InvalidCharacters);
    }
    Ok(())
}

/// 替换或追加 `ADMIN_PASSWORD` 行
fn rewrite_password(content: &str, password: &str) -> String {
    let entry = format!("ADMIN_PASSWORD='{}'", password);
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if !replaced && line.trim_start().starts_with("ADMIN_PASSWORD=") {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// 更新 .env 文件中的管理员密码
pub async fn update_env_password(env_path: &Path, password: &str) -> Result<(), CredentialError> {
    validate_password(password)?;

    let io_err = |source| CredentialError::Io {
        path: env_path.to_path_buf(),
        source,
    };

    let content = match fs::read_to_string(env_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(e)),
    };

    // 同目录临时文件 + rename，避免写到一半的 .env
    let tmp = env_path.with_extension(format!("tmp-{}", std::process::id()));
    if let Err(e) = fs::write(&tmp, rewrite_password(&content, password)).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    fs::rename(&tmp, env_path).await.map_err(io_err)?;

    tracing::info!(path = %env_path.display(), "Admin password updated");
    Ok(())
}
