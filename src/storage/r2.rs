//! Cloudflare R2 存储驱动
//!
//! R2 走 S3 兼容接口：端点固定为 https://<account>.r2.cloudflarestorage.com，
//! region 恒为 "auto"，路径风格寻址。region 参数不参与端点解析，仅记日志。

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
use std::time::Duration;
use tracing::{debug, error, info};

const LIST_PARTS_PAGE_SIZE: i32 = 1000;
const PART_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Cloudflare R2 存储服务
pub struct CloudflareR2Storage {
    client: Client,
    bucket: String,
    upload_dir: String,
    url_expire_secs: u64,
}

impl CloudflareR2Storage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let account_id = config
            .account_id
            .clone()
            .ok_or_else(|| anyhow!("Cloudflare R2 配置缺少 account_id"))?;

        let endpoint = format!("https://{}.r2.cloudflarestorage.com", account_id);

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.access_key_secret.clone(),
            None,
            None,
            "oss-gateway",
        );
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!("初始化Cloudflare R2驱动: endpoint={}, bucket={}", endpoint, config.bucket);

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.bucket.clone(),
            upload_dir: config.upload_dir.clone(),
            url_expire_secs: config.url_expire_secs,
        })
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(
                PresigningConfig::expires_in(expires_in).context("构造预签名配置失败")?,
            )
            .await
            .context("生成R2预签名下载URL失败")?;
        Ok(presigned.uri().to_string())
    }

    async fn upload_inner(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        bucket: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);
        let body = read_all_with_progress(data, size, on_progress.as_ref()).await?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                error!("R2上传文件失败: key={}, 错误: {}", key, e);
                anyhow!("上传文件到Cloudflare R2失败: {}", e)
            })?;

        self.presign_get(bucket, &key, Duration::from_secs(self.url_expire_secs))
            .await
    }
}

#[async_trait]
impl ObjectStorage for CloudflareR2Storage {
    fn name(&self) -> &str {
        "Cloudflare R2"
    }

    fn kind(&self) -> StorageKind {
        StorageKind::CloudflareR2
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, data: ObjectReader, size: u64, object_key: &str) -> Result<String> {
        let bucket = self.bucket.clone();
        self.upload_inner(data, size, object_key, &bucket, None).await
    }

    async fn upload_to_bucket(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<String> {
        debug!("R2 上传忽略 region 参数: region={}", region);
        self.upload_inner(data, size, object_key, bucket, None).await
    }

    async fn upload_to_bucket_with_progress(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        _region: &str,
        bucket: &str,
        on_progress: ProgressFn,
    ) -> Result<String> {
        self.upload_inner(data, size, object_key, bucket, Some(on_progress))
            .await
    }

    async fn init_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<(String, Vec<String>)> {
        let key = full_object_key(&self.upload_dir, object_key);

        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("初始化R2分片上传失败: key={}, 错误: {}", key, e);
                anyhow!("初始化Cloudflare R2分片上传失败: {}", e)
            })?;

        let upload_id = resp
            .upload_id()
            .ok_or_else(|| anyhow!("初始化R2分片上传失败: 未返回 uploadId"))?
            .to_string();

        debug!("R2分片上传初始化完成: key={}, upload_id={}", key, upload_id);
        Ok((upload_id, Vec::new()))
    }

    async fn generate_part_upload_url(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        _region: &str,
        bucket: &str,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);

        let presigned = self
            .client
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
                    "生成R2分片上传URL失败: key={}, part={}, 错误: {}",
                    key, part_number, e
                );
                anyhow!("生成R2分片上传URL失败: {}", e)
            })?;

        Ok(presigned.uri().to_string())
    }

    async fn list_uploaded_parts_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<Vec<Part>> {
        let key = full_object_key(&self.upload_dir, object_key);

        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_parts()
                .bucket(bucket)
                .key(&key)
                .upload_id(upload_id)
                .max_parts(LIST_PARTS_PAGE_SIZE);
            if let Some(m) = &marker {
                req = req.part_number_marker(m);
            }

            let resp = req.send().await.map_err(|e| {
                error!("列举R2分片失败: key={}, 错误: {}", key, e);
                anyhow!("列举Cloudflare R2分片失败: {}", e)
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
        _region: &str,
        bucket: &str,
    ) -> Result<String> {
        let key = full_object_key(&self.upload_dir, object_key);

        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
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
                    "完成R2分片上传失败: key={}, upload_id={}, 错误: {}",
                    key, upload_id, e
                );
                anyhow!("完成Cloudflare R2分片上传失败: {}", e)
            })?;

        info!("R2分片上传合并完成: key={}, parts={}", key, parts.len());
        self.presign_get(bucket, &key, Duration::from_secs(self.url_expire_secs))
            .await
    }

    async fn abort_multipart_upload_to_bucket(
        &self,
        upload_id: &str,
        object_key: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);

        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(&key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| anyhow!("取消Cloudflare R2分片上传失败: {}", e))?;
        Ok(())
    }

    async fn delete_object_from_bucket(
        &self,
        object_key: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("删除R2对象失败: key={}, 错误: {}", key, e);
                anyhow!("删除Cloudflare R2对象失败: {}", e)
            })?;
        Ok(())
    }

    async fn get_object(&self, object_key: &str) -> Result<ObjectReader> {
        let key = full_object_key(&self.upload_dir, object_key);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("获取R2对象失败: key={}, 错误: {}", key, e);
                anyhow!("获取Cloudflare R2对象失败: {}", e)
            })?;

        Ok(Box::new(resp.body.into_async_read()))
    }

    async fn get_object_info(&self, object_key: &str) -> Result<u64> {
        let key = full_object_key(&self.upload_dir, object_key);

        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| anyhow!("获取Cloudflare R2对象信息失败: {}", e))?;

        Ok(resp.content_length().unwrap_or(0) as u64)
    }

    async fn generate_download_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<(String, Option<i64>)> {
        let key = full_object_key(&self.upload_dir, object_key);

        let never_expires = expires_in.is_zero();
        let effective = if never_expires { MAX_PRESIGN_EXPIRY } else { expires_in };

        let url = self.presign_get(&self.bucket, &key, effective).await?;
        if never_expires {
            Ok((url, None))
        } else {
            Ok((url, Some(chrono::Utc::now().timestamp() + effective.as_secs() as i64)))
        }
    }
}
