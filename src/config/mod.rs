// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// JWT 配置
    #[serde(default)]
    pub jwt: JwtConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite 数据库文件路径
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/oss-gateway.db"),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用文件日志
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// 日志级别 (trace/debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节）
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// 日志文件名前缀
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_file_prefix() -> String {
    "oss-gateway".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_retention_days(),
            level: default_log_level(),
            max_file_size: default_max_file_size(),
            file_prefix: default_file_prefix(),
        }
    }
}

/// JWT 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// 签名密钥
    pub secret_key: String,
    /// 签发者
    #[serde(default = "default_jwt_issuer")]
    pub issuer: String,
    /// 令牌有效期（小时）
    #[serde(default = "default_jwt_expire_hours")]
    pub expire_hours: u64,
}

fn default_jwt_issuer() -> String {
    "oss-gateway".to_string()
}

fn default_jwt_expire_hours() -> u64 {
    24
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret_key: "change-me-in-production".to_string(),
            issuer: default_jwt_issuer(),
            expire_hours: default_jwt_expire_hours(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片上传阈值（字节），超过该大小走分片路径
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u64,
    /// 分片大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 分片并发数
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    /// 分片读取超时（秒）
    #[serde(default = "default_chunk_read_timeout")]
    pub chunk_read_timeout_secs: u64,
}

fn default_chunk_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_chunk_size() -> u64 {
    10 * 1024 * 1024
}

fn default_chunk_concurrency() -> usize {
    1
}

fn default_chunk_read_timeout() -> u64 {
    300
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: default_chunk_threshold(),
            chunk_size: default_chunk_size(),
            chunk_concurrency: default_chunk_concurrency(),
            chunk_read_timeout_secs: default_chunk_read_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
            jwt: JwtConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context(format!("读取配置文件失败: {}", path))?;
        let config: AppConfig =
            toml::from_str(&content).context(format!("解析配置文件失败: {}", path))?;
        Ok(config)
    }

    /// 加载配置，失败时使用默认值
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("加载配置失败，使用默认配置: {}", e);
                Self::default()
            }
        }
    }
}
