//! AWS S3 存储驱动
//!
//! 基于 aws-sdk-s3，静态凭证。region 参数按请求解析：
//! 指定 region 时为该地域单独构建客户端并缓存，否则使用配置地域。

use crate::db::models::StorageConfig;
use crate::storage::{
    full_object_key, read_all_with_progress, trim_etag, ObjectReader, ObjectStorage, Part,
    ProgressFn, StorageKind, MAX_PRESIGN_EXPIRY,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, error, info};

/// 列举分片的单页上限
const LIST_PARTS_PAGE_SIZE: i32 = 1000;

/// 分片预签名URL有效期
const PART_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// AWS S3 存储服务
pub struct AwsS3Storage {
    access_key_id: String,
    access_key_secret: String,
    /// 配置地域（region 参数为空时的回退）
    default_region: String,
    bucket: String,
    upload_dir: String,
    url_expire_secs: u64,
    /// 按地域缓存的客户端
    clients: DashMap<String, Client>,
}

impl AwsS3Storage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let default_region = config
            .region
            .clone()
            .ok_or_else(|| anyhow!("AWS S3 配置缺少 region"))?;

        info!(
            "初始化AWS S3驱动: region={}, bucket={}",
            default_region, config.bucket
        );

        Ok(Self {
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            default_region,
            bucket: config.bucket.clone(),
            upload_dir: config.upload_dir.clone(),
            url_expire_secs: config.url_expire_secs,
            clients: DashMap::new(),
        })
    }

    /// 获取指定地域的客户端（按地域缓存）
    fn client_for(&self, region: &str) -> Client {
        let region = if region.is_empty() {
            self.default_region.as_str()
        } else {
            region
        };

        if let Some(client) = self.clients.get(region) {
            return client.clone();
        }

        let credentials = Credentials::new(
            self.access_key_id.clone(),
            self.access_key_secret.clone(),
            None,
            None,
            "oss-gateway",
        );
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();
        let client = Client::from_conf(conf);

        debug!("S3 客户端已创建并缓存: region={}", region);
        self.clients
            .entry(region.to_string())
            .or_insert(client)
            .clone()
    }

    async fn presign_get(&self, client: &Client, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let presigned = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(
                PresigningConfig::expires_in(expires_in).context("构造预签名配置失败")?,
            )
            .await
            .context("生成S3预签名下载URL失败")?;
        Ok(presigned.uri().to_string())
    }

    async fn upload_inner(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);
        let body = read_all_with_progress(data, size, on_progress.as_ref()).await?;

        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                error!("S3上传文件失败: key={}, 错误: {}", key, e);
                anyhow!("上传文件到AWS S3失败: {}", e)
            })?;

        self.presign_get(&client, bucket, &key, Duration::from_secs(self.url_expire_secs))
            .await
    }
}

#[async_trait]
impl ObjectStorage for AwsS3Storage {
    fn name(&self) -> &str {
        "AWS S3"
    }

    fn kind(&self) -> StorageKind {
        StorageKind::AwsS3
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, data: ObjectReader, size: u64, object_key: &str) -> Result<String> {
        let bucket = self.bucket.clone();
        self.upload_inner(data, size, object_key, "", &bucket, None).await
    }

    async fn upload_to_bucket(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<String> {
        self.upload_inner(data, size, object_key, region, bucket, None).await
    }

    async fn upload_to_bucket_with_progress(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
        on_progress: ProgressFn,
    ) -> Result<String> {
        self.upload_inner(data, size, object_key, region, bucket, Some(on_progress))
            .await
    }

    async fn init_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<(String, Vec<String>)> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        let resp = client
            .create_multipart_upload()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("初始化S3分片上传失败: key={}, 错误: {}", key, e);
                anyhow!("初始化AWS S3分片上传失败: {}", e)
            })?;

        let upload_id = resp
            .upload_id()
            .ok_or_else(|| anyhow!("初始化S3分片上传失败: 未返回 uploadId"))?
            .to_string();

        debug!("S3分片上传初始化完成: key={}, upload_id={}", key, upload_id);
        Ok((upload_id, Vec::new()))
    }

    async fn generate_part_upload_url(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        region: &str,
        bucket: &str,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        // SigV4 查询签名：未列入 SignedHeaders 的头不参与校验，
        // 客户端照常携带 application/octet-stream 即可
        let presigned = client
            .upload_part()
            .bucket(bucket)
            .key(&key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .presigned(
                PresigningConfig::expires_in(PART_URL_EXPIRY).context("构造预签名配置失败")?,
            )
            .await
            .map_err(|e| {
                error!(
                    "生成S3分片上传URL失败: key={}, part={}, 错误: {}",
                    key, part_number, e
                );
                anyhow!("生成S3分片上传URL失败: {}", e)
            })?;

        Ok(presigned.uri().to_string())
    }

    async fn list_uploaded_parts_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        region: &str,
        bucket: &str,
    ) -> Result<Vec<Part>> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = client
                .list_parts()
                .bucket(bucket)
                .key(&key)
                .upload_id(upload_id)
                .max_parts(LIST_PARTS_PAGE_SIZE);
            if let Some(m) = &marker {
                req = req.part_number_marker(m);
            }

            let resp = req.send().await.map_err(|e| {
                error!("列举S3分片失败: key={}, 错误: {}", key, e);
                anyhow!("列举AWS S3分片失败: {}", e)
            })?;

            for p in resp.parts() {
                let (Some(number), Some(etag)) = (p.part_number(), p.e_tag()) else {
                    continue;
                };
                parts.push(Part {
                    part_number: number as u32,
                    etag: trim_etag(etag),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                marker = resp.next_part_number_marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn complete_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[Part],
        region: &str,
        bucket: &str,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(&key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                error!(
                    "完成S3分片上传失败: key={}, upload_id={}, 错误: {}",
                    key, upload_id, e
                );
                anyhow!("完成AWS S3分片上传失败: {}", e)
            })?;

        info!("S3分片上传合并完成: key={}, parts={}", key, parts.len());
        self.presign_get(&client, bucket, &key, Duration::from_secs(self.url_expire_secs))
            .await
    }

    async fn abort_multipart_upload_to_bucket(
        &self,
        upload_id: &str,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(&key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| anyhow!("取消AWS S3分片上传失败: {}", e))?;
        Ok(())
    }

    async fn delete_object_from_bucket(
        &self,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for(region);

        client
            .delete_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("删除S3对象失败: key={}, 错误: {}", key, e);
                anyhow!("删除AWS S3对象失败: {}", e)
            })?;
        Ok(())
    }

    async fn get_object(&self, object_key: &str) -> Result<ObjectReader> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for("");

        let resp = client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("获取S3对象失败: key={}, 错误: {}", key, e);
                anyhow!("获取AWS S3对象失败: {}", e)
            })?;

        Ok(Box::new(resp.body.into_async_read()))
    }

    async fn get_object_info(&self, object_key: &str) -> Result<u64> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for("");

        let resp = client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| anyhow!("获取AWS S3对象信息失败: {}", e))?;

        Ok(resp.content_length().unwrap_or(0) as u64)
    }

    async fn generate_download_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<(String, Option<i64>)> {
        let key = full_object_key(&self.upload_dir, object_key);
        let client = self.client_for("");

        let never_expires = expires_in.is_zero();
        let effective = if never_expires { MAX_PRESIGN_EXPIRY } else { expires_in };

        let url = self.presign_get(&client, &self.bucket, &key, effective).await?;
        if never_expires {
            Ok((url, None))
        } else {
            Ok((url, Some(chrono::Utc::now().timestamp() + effective.as_secs() as i64)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            id: 2,
            name: "s3".to_string(),
            storage_type: StorageKind::AwsS3,
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            endpoint: None,
            bucket: "alpha".to_string(),
            region: Some("us-east-1".to_string()),
            account_id: None,
            upload_dir: "uploads".to_string(),
            url_expire_secs: 86400,
            is_default: false,
            transfer_accelerate: Default::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_new_requires_region() {
        let mut c = config();
        c.region = None;
        assert!(AwsS3Storage::new(&c).is_err());
        assert!(AwsS3Storage::new(&config()).is_ok());
    }

    #[tokio::test]
    async fn test_client_cache_per_region() {
        let storage = AwsS3Storage::new(&config()).unwrap();
        let _ = storage.client_for("us-east-1");
        let _ = storage.client_for("eu-west-1");
        // 空 region 回退到配置地域，不新增缓存项
        let _ = storage.client_for("");
        assert_eq!(storage.clients.len(), 2);
    }
}
