//! 认证中间件
//!
//! 从 Authorization 头解析 Bearer 令牌（兼容裸令牌），
//! 将当前用户注入请求扩展，供各处理器提取

use crate::auth::jwt;
use crate::server::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// 当前登录用户（由认证中间件注入）
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
}

/// JWT 认证中间件
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_token(&req) {
        Some(token) => token,
        None => {
            return ApiError::unauthorized("缺少认证令牌").into_response();
        }
    };

    let claims = match jwt::parse_token(&token, &state.config.jwt) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("令牌校验失败: {}", e);
            return ApiError::unauthorized("认证令牌无效或已过期").into_response();
        }
    };

    req.extensions_mut().insert(CurrentUser {
        user_id: claims.user_id,
        username: claims.username,
    });

    next.run(req).await
}

/// 提取令牌：支持 "Bearer <jwt>" 与裸令牌两种形式
fn extract_token(req: &Request) -> Option<String> {
    let value = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/v1/oss/files");
        if let Some(v) = value {
            builder = builder.header("Authorization", v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = request_with_auth(Some("Bearer abc.def.ghi"));
        assert_eq!(extract_token(&req), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn test_extract_raw_token() {
        let req = request_with_auth(Some("abc.def.ghi"));
        assert_eq!(extract_token(&req), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn test_extract_missing_or_empty() {
        assert_eq!(extract_token(&request_with_auth(None)), None);
        assert_eq!(extract_token(&request_with_auth(Some("Bearer "))), None);
    }
}
