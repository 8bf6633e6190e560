//! 统一错误处理
//!
//! 提供 `ApiError` 枚举实现 `IntoResponse`，替代重复的 `(StatusCode, Json<ErrorResponse>)` 模式

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::env::constants::AUTH_REALM;
use crate::domain::CodecError;
use crate::services::credentials::CredentialError;
use crate::services::{BackupError, DeployError};

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 未授权（Basic Auth 凭据无效或缺失）
    Unauthorized,
    /// 400 - 请求无效（如：配置无法解析）
    BadRequest(String),
    /// 409 - 冲突（如：部署已在进行）
    Conflict(String),
    /// 500 - 内部错误
    Internal(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_type, message) = match self {
            ApiError::Unauthorized => ("unauthorized", "Authentication required".to_string()),
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        let body = Json(ErrorResponse::new(error_type, message));
        if status == StatusCode::UNAUTHORIZED {
            let challenge = format!("Basic realm=\"{}\"", AUTH_REALM);
            return (status, [(header::WWW_AUTHENTICATE, challenge)], body).into_response();
        }
        (status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::Parse(_) => ApiError::bad_request(e.to_string()),
            DeployError::InProgress => ApiError::conflict(e.to_string()),
            DeployError::Interrupted(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(e: CodecError) -> Self {
        ApiError::internal(format!("Failed to read config: {}", e))
    }
}

impl From<BackupError> for ApiError {
    fn from(e: BackupError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::TooShort | CredentialError::InvalidCharacters => {
                ApiError::bad_request(e.to_string())
            }
            CredentialError::Io { .. } => ApiError::internal(e.to_string()),
        }
    }
}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_new() {
        let resp = ErrorResponse::new("test_error", "Test message");
        assert_eq!(resp.error, "test_error");
        assert_eq!(resp.message, "Test message");
        assert!(resp.details.is_none());
    }

    #[test]
    fn test_error_response_with_details() {
        let resp = ErrorResponse::new("test_error", "Test message").with_details("Extra info");
        assert_eq!(resp.details, Some("Extra info".to_string()));
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let resp = ApiError::unauthorized().into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert_eq!(challenge, "Basic realm=\"FRP Management Panel\"");
    }

    #[test]
    fn test_deploy_error_status_mapping() {
        assert_eq!(
            ApiError::from(DeployError::InProgress).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(DeployError::Parse(CodecError::NotAnObject)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CredentialError::TooShort).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
