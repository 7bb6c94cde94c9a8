// 数据库行模型定义

use crate::storage::StorageKind;
use serde::{Deserialize, Serialize};

/// 文件记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// 当前有效
    Active,
    /// 被同键新上传替换
    Replaced,
    /// 用户删除（软删除）
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "ACTIVE",
            FileStatus::Replaced => "REPLACED",
            FileStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(FileStatus::Active),
            "REPLACED" => Some(FileStatus::Replaced),
            "DELETED" => Some(FileStatus::Deleted),
            _ => None,
        }
    }
}

/// MD5 计算状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Md5Status {
    /// 待计算
    Pending,
    /// 计算中
    Calculating,
    /// 已完成
    Completed,
    /// 计算失败
    Failed,
}

impl Md5Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Md5Status::Pending => "PENDING",
            Md5Status::Calculating => "CALCULATING",
            Md5Status::Completed => "COMPLETED",
            Md5Status::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Md5Status::Pending),
            "CALCULATING" => Some(Md5Status::Calculating),
            "COMPLETED" => Some(Md5Status::Completed),
            "FAILED" => Some(Md5Status::Failed),
            _ => None,
        }
    }
}

/// 文件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// 记录ID
    pub id: i64,
    /// 存储配置ID
    pub config_id: i64,
    /// 规范化文件名（即对象键）
    pub filename: String,
    /// 客户端原始文件名
    pub original_filename: String,
    /// 文件大小（字节）
    pub file_size: u64,
    /// 文件 MD5
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// MD5 计算状态
    pub md5_status: Md5Status,
    /// 存储类型
    pub storage_type: StorageKind,
    /// 存储桶
    pub bucket: String,
    /// 对象键
    pub object_key: String,
    /// 下载URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// 下载URL过期时间 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// 上传者ID
    pub uploader_id: i64,
    /// 上传者IP
    pub upload_ip: String,
    /// 记录状态
    pub status: FileStatus,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 更新时间 (Unix timestamp)
    pub updated_at: i64,
}

/// 待插入的文件记录（入库后获得 id 与时间戳）
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub config_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_size: u64,
    pub storage_type: StorageKind,
    pub bucket: String,
    pub object_key: String,
    pub download_url: Option<String>,
    pub expires_at: Option<i64>,
    pub uploader_id: i64,
    pub upload_ip: String,
}

/// 传输加速模式（阿里云 OSS）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferAccelerate {
    /// 关闭加速
    #[default]
    Off,
    /// 全球加速
    Global,
    /// 海外加速
    Overseas,
}

impl TransferAccelerate {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAccelerate::Off => "off",
            TransferAccelerate::Global => "global",
            TransferAccelerate::Overseas => "overseas",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "global" => TransferAccelerate::Global,
            "overseas" => TransferAccelerate::Overseas,
            _ => TransferAccelerate::Off,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 配置ID
    pub id: i64,
    /// 配置名称
    pub name: String,
    /// 存储类型
    pub storage_type: StorageKind,
    /// Access Key ID
    #[serde(skip_serializing)]
    pub access_key_id: String,
    /// Access Key Secret
    #[serde(skip_serializing)]
    pub access_key_secret: String,
    /// 服务端点
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// 默认存储桶
    pub bucket: String,
    /// 默认地域
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// 账号ID（Cloudflare R2 专用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// 上传目录前缀
    pub upload_dir: String,
    /// 下载URL有效期（秒）
    pub url_expire_secs: u64,
    /// 是否为默认配置（全表至多一条）
    pub is_default: bool,
    /// 传输加速模式
    pub transfer_accelerate: TransferAccelerate,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 更新时间 (Unix timestamp)
    pub updated_at: i64,
}

/// 地域-桶映射
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionBucketMapping {
    pub id: i64,
    /// 地域代码（如 cn-hangzhou、us-east-1）
    pub region_code: String,
    /// 桶名称
    pub bucket_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_roundtrip() {
        for s in [FileStatus::Active, FileStatus::Replaced, FileStatus::Deleted] {
            assert_eq!(FileStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(FileStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_md5_status_roundtrip() {
        for s in [
            Md5Status::Pending,
            Md5Status::Calculating,
            Md5Status::Completed,
            Md5Status::Failed,
        ] {
            assert_eq!(Md5Status::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_transfer_accelerate_parse() {
        assert_eq!(TransferAccelerate::parse("global"), TransferAccelerate::Global);
        assert_eq!(TransferAccelerate::parse("overseas"), TransferAccelerate::Overseas);
        assert_eq!(TransferAccelerate::parse("off"), TransferAccelerate::Off);
        // 未知值按关闭处理
        assert_eq!(TransferAccelerate::parse("bogus"), TransferAccelerate::Off);
    }
}
