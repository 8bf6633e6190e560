//! Basic Auth 认证
//!
//! 提供 `RequireBasicAuth` extractor，所有面板接口都通过它校验管理员凭据

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, header::HeaderMap, request::Parts},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Basic Auth 认证 Extractor
///
/// # Example
///
/// ```ignore
/// async fn protected_handler(
///     _auth: RequireBasicAuth,
///     State(state): State<Arc<AppState>>,
/// ) -> impl IntoResponse {
///     // handler 逻辑...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireBasicAuth {
    pub user: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireBasicAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credentials = state.credentials.read().await;
        verify_basic_auth(&parts.headers, &credentials)
    }
}

/// 校验 `Authorization: Basic <base64(user:password)>`
pub fn verify_basic_auth(
    headers: &HeaderMap,
    expected: &AuthConfig,
) -> Result<RequireBasicAuth, ApiError> {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        tracing::debug!("Missing Authorization header");
        return Err(ApiError::unauthorized());
    };

    let decoded = value
        .strip_prefix("Basic ")
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());

    let Some(decoded) = decoded else {
        tracing::warn!("Malformed Basic Auth header");
        return Err(ApiError::unauthorized());
    };

    match decoded.split_once(':') {
        Some((user, password)) if credentials_match(user, password, expected) => {
            Ok(RequireBasicAuth {
                user: user.to_string(),
            })
        }
        Some((user, _)) => {
            tracing::warn!(user, "Invalid panel credentials");
            Err(ApiError::unauthorized())
        }
        None => {
            tracing::warn!("Basic Auth credentials without separator");
            Err(ApiError::unauthorized())
        }
    }
}

/// 常量时间比较，用户名和密码都参与比较
fn credentials_match(user: &str, password: &str, expected: &AuthConfig) -> bool {
    let user_ok = user.as_bytes().ct_eq(expected.user.as_bytes());
    let password_ok = password.as_bytes().ct_eq(expected.password.as_bytes());
    (user_ok & password_ok).into()
}
