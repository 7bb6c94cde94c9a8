//! JWT 令牌解析
//!
//! 网关只消费令牌中的 user_id / username 两个声明，
//! 签发由外部用户系统负责（这里保留 generate_token 供测试与工具使用）

use crate::config::JwtConfig;
use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT 声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub user_id: i64,
    /// 用户名
    pub username: String,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
    /// 签发时间 (Unix timestamp)
    pub iat: i64,
    /// 签发者
    pub iss: String,
}

/// 生成JWT令牌
pub fn generate_token(user_id: i64, username: &str, config: &JwtConfig) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id,
        username: username.to_string(),
        exp: now + (config.expire_hours * 3600) as i64,
        iat: now,
        iss: config.issuer.clone(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| anyhow!("生成令牌失败: {}", e))
}

/// 解析并校验JWT令牌
pub fn parse_token(token: &str, config: &JwtConfig) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret_key.as_bytes()),
        &validation,
    )
    .map_err(|e| anyhow!("令牌无效: {}", e))?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret_key: "test-secret".to_string(),
            issuer: "oss-gateway".to_string(),
            expire_hours: 1,
        }
    }

    #[test]
    fn test_generate_and_parse() {
        let config = test_config();
        let token = generate_token(42, "alice", &config).unwrap();
        let claims = parse_token(&token, &config).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "oss-gateway");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = test_config();
        let token = generate_token(42, "alice", &config).unwrap();

        let mut other = test_config();
        other.secret_key = "another-secret".to_string();
        assert!(parse_token(&token, &other).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let config = test_config();
        assert!(parse_token("not-a-token", &config).is_err());
    }
}
