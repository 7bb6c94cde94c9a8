//! API 错误与统一响应封装
//!
//! 所有响应统一为 {code, message, data?}，HTTP 状态恒为 200，
//! 业务状态由 code 表达（前端按 code 分支处理）

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

// 通用状态码
pub const CODE_SUCCESS: i32 = 200;
pub const CODE_INVALID_PARAMS: i32 = 400;
pub const CODE_UNAUTHORIZED: i32 = 401;
pub const CODE_FORBIDDEN: i32 = 403;
pub const CODE_NOT_FOUND: i32 = 404;
pub const CODE_INTERNAL_ERROR: i32 = 500;

// OSS相关状态码
pub const CODE_FILE_EXISTS: i32 = 40009;
pub const CODE_CONFIG_NOT_FOUND: i32 = 40404;
pub const CODE_FILE_NOT_FOUND: i32 = 40405;
pub const CODE_SERVER_ERROR: i32 = 50001;

/// 统一响应结构
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 业务状态码 (200: 成功)
    pub code: i32,
    /// 消息
    pub message: String,
    /// 数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            code: CODE_SUCCESS,
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

/// API 错误
#[derive(Debug)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_PARAMS, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(CODE_UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(CODE_FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CODE_NOT_FOUND, message)
    }

    pub fn file_exists(message: impl Into<String>) -> Self {
        Self::new(CODE_FILE_EXISTS, message)
    }

    pub fn config_not_found(message: impl Into<String>) -> Self {
        Self::new(CODE_CONFIG_NOT_FOUND, message)
    }

    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(CODE_FILE_NOT_FOUND, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CODE_SERVER_ERROR, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("API错误响应: code={}, message={}", self.code, self.message);
        let body: ApiResponse<()> = ApiResponse {
            code: self.code,
            message: self.message,
            data: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// 成功响应的简写
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::file_exists("x").code, 40009);
        assert_eq!(ApiError::config_not_found("x").code, 40404);
        assert_eq!(ApiError::file_not_found("x").code, 40405);
        assert_eq!(ApiError::server_error("x").code, 50001);
    }

    #[test]
    fn test_envelope_shape() {
        let resp = ApiResponse::success(42);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 200);
        assert_eq!(json["data"], 42);

        let empty = ApiResponse::<()>::success_empty();
        let json = serde_json::to_value(&empty).unwrap();
        assert!(json.get("data").is_none());
    }
}
