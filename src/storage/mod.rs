//! 存储驱动模块
//!
//! 对异构云存储（阿里云 OSS / AWS S3 / Cloudflare R2）暴露统一能力接口。
//! 驱动差异（ETag 引号、Content-Type 签名、端点解析）全部封装在各驱动内部。

pub mod aliyun;
pub mod factory;
pub mod r2;
pub mod s3;

#[cfg(test)]
pub mod mock;

pub use aliyun::AliyunOssStorage;
pub use factory::StorageFactory;
pub use r2::CloudflareR2Storage;
pub use s3::AwsS3Storage;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// 存储类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// 阿里云 OSS
    #[serde(rename = "ALIYUN_OSS")]
    AliyunOss,
    /// AWS S3
    #[serde(rename = "AWS_S3")]
    AwsS3,
    /// Cloudflare R2
    #[serde(rename = "CLOUDFLARE_R2")]
    CloudflareR2,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::AliyunOss => "ALIYUN_OSS",
            StorageKind::AwsS3 => "AWS_S3",
            StorageKind::CloudflareR2 => "CLOUDFLARE_R2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALIYUN_OSS" => Some(StorageKind::AliyunOss),
            "AWS_S3" => Some(StorageKind::AwsS3),
            "CLOUDFLARE_R2" => Some(StorageKind::CloudflareR2),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分片信息
///
/// Complete 时必须按 part_number 升序且连续（1..N）；etag 不带引号
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Part {
    pub part_number: u32,
    pub etag: String,
}

/// 上传进度回调 (consumed, total)
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// 驱动读取流
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// 统一存储能力接口
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 存储服务展示名
    fn name(&self) -> &str;

    /// 存储类型
    fn kind(&self) -> StorageKind;

    /// 默认存储桶
    fn bucket_name(&self) -> &str;

    /// 单次上传到默认桶
    async fn upload(&self, data: ObjectReader, size: u64, object_key: &str) -> Result<String>;

    /// 单次上传到指定 (region, bucket)
    async fn upload_to_bucket(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<String>;

    /// 单次上传到指定桶，带进度回调
    async fn upload_to_bucket_with_progress(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
        on_progress: ProgressFn,
    ) -> Result<String>;

    /// 初始化分片上传
    ///
    /// # 返回
    /// (upload_id, 预签名URL列表)；URL列表可为空，分片URL可按需生成
    async fn init_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<(String, Vec<String>)>;

    /// 生成单个分片的预签名 PUT URL
    ///
    /// 签名必须覆盖 Content-Type: application/octet-stream，
    /// 否则部分服务商会以 SignatureDoesNotMatch 拒绝
    async fn generate_part_upload_url(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        region: &str,
        bucket: &str,
    ) -> Result<String>;

    /// 枚举已上传分片（分页拉全，按 part_number 升序，etag 去引号）
    async fn list_uploaded_parts_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        region: &str,
        bucket: &str,
    ) -> Result<Vec<Part>>;

    /// 完成分片上传
    async fn complete_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[Part],
        region: &str,
        bucket: &str,
    ) -> Result<String>;

    /// 取消分片上传
    ///
    /// 调用方以尽力而为方式使用：失败只记日志，不向上传播
    async fn abort_multipart_upload_to_bucket(
        &self,
        upload_id: &str,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()>;

    /// 删除对象
    async fn delete_object_from_bucket(
        &self,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()>;

    /// 读取对象内容
    async fn get_object(&self, object_key: &str) -> Result<ObjectReader>;

    /// 获取对象大小
    async fn get_object_info(&self, object_key: &str) -> Result<u64>;

    /// 生成预签名下载URL
    ///
    /// expires_in 为零表示「永不过期」：按服务商上限签发并返回 None
    async fn generate_download_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<(String, Option<i64>)>;
}

/// 「永不过期」请求的实际签发时长上限（阿里云 OSS 上限 7 天）
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 3600);

/// 拼接上传目录前缀与对象键
pub(crate) fn full_object_key(upload_dir: &str, object_key: &str) -> String {
    let dir = upload_dir.trim_matches('/');
    let key = object_key.trim_start_matches('/');
    if dir.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", dir, key)
    }
}

/// 去除 ETag 两侧引号（Complete 接口要求规范形式）
pub(crate) fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// 读取整个流，按块回调进度
pub(crate) async fn read_all_with_progress(
    mut data: ObjectReader,
    size: u64,
    on_progress: Option<&ProgressFn>,
) -> Result<Vec<u8>> {
    const READ_CHUNK: usize = 256 * 1024;

    let mut buf = Vec::with_capacity(size as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = data.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(cb) = on_progress {
            cb(buf.len() as u64, size);
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_roundtrip() {
        for kind in [StorageKind::AliyunOss, StorageKind::AwsS3, StorageKind::CloudflareR2] {
            assert_eq!(StorageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(StorageKind::parse("GCS"), None);
    }

    #[test]
    fn test_full_object_key() {
        assert_eq!(full_object_key("uploads", "alice/a.txt"), "uploads/alice/a.txt");
        assert_eq!(full_object_key("", "alice/a.txt"), "alice/a.txt");
        assert_eq!(full_object_key("/uploads/", "/alice/a.txt"), "uploads/alice/a.txt");
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc123\""), "abc123");
        assert_eq!(trim_etag("abc123"), "abc123");
    }

    #[tokio::test]
    async fn test_read_all_with_progress() {
        let data = vec![7u8; 1024];
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cb: ProgressFn = Arc::new(move |consumed, total| {
            seen2.lock().push((consumed, total));
        });

        let out = read_all_with_progress(Box::new(std::io::Cursor::new(data)), 1024, Some(&cb))
            .await
            .unwrap();
        assert_eq!(out.len(), 1024);

        let calls = seen.lock();
        assert!(!calls.is_empty());
        assert_eq!(calls.last().unwrap(), &(1024, 1024));
    }
}
