//! 阿里云 OSS 存储驱动
//!
//! 直接对接 OSS REST API（V1 签名），不依赖官方 SDK：
//! - 头部签名：PUT/POST/DELETE/HEAD 等服务端直连请求
//! - URL 签名：分片预签名 PUT、下载预签名 GET
//!
//! 端点解析策略：
//! 1. 开启传输加速 -> oss-accelerate(.overseas).aliyuncs.com
//! 2. 指定 region -> oss-<region>.aliyuncs.com
//! 3. 否则使用配置的 endpoint

use crate::db::models::{StorageConfig, TransferAccelerate};
use crate::storage::{
    full_object_key, read_all_with_progress, trim_etag, ObjectReader, ObjectStorage, Part,
    ProgressFn, StorageKind, MAX_PRESIGN_EXPIRY,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

/// 全球加速端点
const ACCELERATE_ENDPOINT: &str = "oss-accelerate.aliyuncs.com";
/// 海外加速端点
const ACCELERATE_OVERSEAS_ENDPOINT: &str = "oss-accelerate-overseas.aliyuncs.com";

/// 列举分片的单页上限
const LIST_PARTS_PAGE_SIZE: u32 = 1000;

/// 阿里云 OSS 存储服务
pub struct AliyunOssStorage {
    http: reqwest::Client,
    access_key_id: String,
    access_key_secret: String,
    /// 配置端点（不带协议前缀，如 oss-cn-hangzhou.aliyuncs.com）
    endpoint: String,
    bucket: String,
    upload_dir: String,
    url_expire_secs: u64,
    accelerate: TransferAccelerate,
}

impl AliyunOssStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| config.region.as_ref().map(|r| format!("oss-{}.aliyuncs.com", r)))
            .ok_or_else(|| anyhow!("阿里云OSS配置缺少 endpoint 和 region"))?;
        let endpoint = strip_scheme(&endpoint).to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!(
            "初始化阿里云OSS驱动: endpoint={}, bucket={}, 加速={}",
            endpoint,
            config.bucket,
            config.transfer_accelerate.as_str()
        );

        Ok(Self {
            http,
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            endpoint,
            bucket: config.bucket.clone(),
            upload_dir: config.upload_dir.clone(),
            url_expire_secs: config.url_expire_secs,
            accelerate: config.transfer_accelerate,
        })
    }

    /// 解析请求主机名
    fn resolve_host(&self, region: &str) -> String {
        match self.accelerate {
            TransferAccelerate::Global => ACCELERATE_ENDPOINT.to_string(),
            TransferAccelerate::Overseas => ACCELERATE_OVERSEAS_ENDPOINT.to_string(),
            TransferAccelerate::Off => {
                if !region.is_empty() {
                    format!("oss-{}.aliyuncs.com", region)
                } else {
                    self.endpoint.clone()
                }
            }
        }
    }

    /// 虚拟主机风格的对象URL
    fn object_url(&self, bucket: &str, region: &str, key: &str, query: &str) -> String {
        let host = self.resolve_host(region);
        let path = encode_key(key);
        if query.is_empty() {
            format!("https://{}.{}/{}", bucket, host, path)
        } else {
            format!("https://{}.{}/{}?{}", bucket, host, path, query)
        }
    }

    /// 计算V1签名
    fn sign(&self, string_to_sign: &str) -> String {
        sign_v1(&self.access_key_secret, string_to_sign)
    }

    /// 头部签名请求的 Authorization 与 Date
    fn auth_headers(
        &self,
        verb: &str,
        content_md5: &str,
        content_type: &str,
        resource: &str,
    ) -> (String, String) {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}",
            verb, content_md5, content_type, date, resource
        );
        let authorization = format!("OSS {}:{}", self.access_key_id, self.sign(&string_to_sign));
        (authorization, date)
    }

    /// URL 查询签名
    ///
    /// # 参数
    /// * `content_type` - 客户端实际会携带的 Content-Type（必须一并签名）
    fn presign_url(
        &self,
        verb: &str,
        bucket: &str,
        region: &str,
        key: &str,
        subresource: &str,
        content_type: &str,
        expires_at: i64,
    ) -> String {
        let resource = canonical_resource(bucket, key, subresource);
        let string_to_sign = format!("{}\n\n{}\n{}\n{}", verb, content_type, expires_at, resource);
        let signature = self.sign(&string_to_sign);

        let mut query = String::new();
        if !subresource.is_empty() {
            query.push_str(subresource);
            query.push('&');
        }
        query.push_str(&format!(
            "OSSAccessKeyId={}&Expires={}&Signature={}",
            urlencoding::encode(&self.access_key_id),
            expires_at,
            urlencoding::encode(&signature)
        ));

        self.object_url(bucket, region, key, &query)
    }

    /// 服务端直连 PUT（单次上传）
    async fn put_object(
        &self,
        bucket: &str,
        region: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        let resource = canonical_resource(bucket, key, "");
        let content_type = "application/octet-stream";
        let (authorization, date) = self.auth_headers("PUT", "", content_type, &resource);
        let url = self.object_url(bucket, region, key, "");

        let resp = self
            .http
            .put(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .header("Content-Type", content_type)
            .header("Content-Length", body.len())
            .body(body)
            .send()
            .await
            .context("阿里云OSS PutObject 请求失败")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("阿里云OSS上传失败: key={}, status={}, 响应: {}", key, status, text);
            return Err(anyhow!("阿里云OSS上传失败: HTTP {}", status));
        }
        Ok(())
    }

    /// 上传并返回预签名下载URL（Upload 家族共用）
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
        let body = read_all_with_progress(data, size, on_progress.as_ref()).await?;
        self.put_object(bucket, region, &key, body).await?;

        let expires_at = chrono::Utc::now().timestamp() + self.url_expire_secs as i64;
        Ok(self.presign_url("GET", bucket, region, &key, "", "", expires_at))
    }
}

fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// 对象键逐段URL编码（保留路径分隔符）
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// CanonicalizedResource："/bucket/key[?子资源]"（键不做URL编码）
fn canonical_resource(bucket: &str, key: &str, subresource: &str) -> String {
    if subresource.is_empty() {
        format!("/{}/{}", bucket, key)
    } else {
        format!("/{}/{}?{}", bucket, key, subresource)
    }
}

/// V1 签名：base64(hmac-sha1(secret, string_to_sign))
fn sign_v1(secret: &str, string_to_sign: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .expect("HMAC 密钥长度任意，不会失败");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

// =====================================================
// XML 响应结构
// =====================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateMultipartUploadResult {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListPartsResult {
    #[serde(default)]
    part: Vec<ListedPart>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_part_number_marker: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPart {
    part_number: u32,
    e_tag: String,
}

#[async_trait]
impl ObjectStorage for AliyunOssStorage {
    fn name(&self) -> &str {
        "阿里云OSS"
    }

    fn kind(&self) -> StorageKind {
        StorageKind::AliyunOss
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
        let resource = canonical_resource(bucket, &key, "uploads");
        let (authorization, date) = self.auth_headers("POST", "", "", &resource);
        let url = self.object_url(bucket, region, &key, "uploads");

        let resp = self
            .http
            .post(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .send()
            .await
            .context("阿里云OSS InitiateMultipartUpload 请求失败")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("初始化分片上传失败: key={}, status={}, 响应: {}", key, status, text);
            return Err(anyhow!("初始化阿里云OSS分片上传失败: HTTP {}", status));
        }

        let xml = resp.text().await.context("读取响应失败")?;
        let result: InitiateMultipartUploadResult =
            quick_xml::de::from_str(&xml).context("解析 InitiateMultipartUpload 响应失败")?;

        debug!("分片上传初始化完成: key={}, upload_id={}", key, result.upload_id);
        // 分片URL按需生成（generate_part_upload_url），这里不预签
        Ok((result.upload_id, Vec::new()))
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
        // 子资源按字典序排列，与 CanonicalizedResource 保持一致
        let subresource = format!(
            "partNumber={}&uploadId={}",
            part_number,
            urlencoding::encode(upload_id)
        );
        let expires_at = chrono::Utc::now().timestamp() + 3600;

        // 客户端 PUT 会携带 application/octet-stream，签名必须覆盖
        Ok(self.presign_url(
            "PUT",
            bucket,
            region,
            &key,
            &subresource,
            "application/octet-stream",
            expires_at,
        ))
    }

    async fn list_uploaded_parts_to_bucket(
        &self,
        object_key: &str,
        upload_id: &str,
        region: &str,
        bucket: &str,
    ) -> Result<Vec<Part>> {
        let key = full_object_key(&self.upload_dir, object_key);
        let mut parts = Vec::new();
        let mut marker: Option<u32> = None;

        loop {
            // 子资源仅含 uploadId 参与签名；分页参数为普通查询参数
            let sign_subresource =
                format!("uploadId={}", urlencoding::encode(upload_id));
            let resource = canonical_resource(bucket, &key, &sign_subresource);
            let (authorization, date) = self.auth_headers("GET", "", "", &resource);

            let mut query = format!(
                "uploadId={}&max-parts={}",
                urlencoding::encode(upload_id),
                LIST_PARTS_PAGE_SIZE
            );
            if let Some(m) = marker {
                query.push_str(&format!("&part-number-marker={}", m));
            }
            let url = self.object_url(bucket, region, &key, &query);

            let resp = self
                .http
                .get(&url)
                .header("Authorization", authorization)
                .header("Date", date)
                .send()
                .await
                .context("阿里云OSS ListParts 请求失败")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                error!("列举分片失败: key={}, status={}, 响应: {}", key, status, text);
                return Err(anyhow!("列举阿里云OSS分片失败: HTTP {}", status));
            }

            let xml = resp.text().await.context("读取响应失败")?;
            let result: ListPartsResult =
                quick_xml::de::from_str(&xml).context("解析 ListParts 响应失败")?;

            for p in result.part {
                parts.push(Part {
                    part_number: p.part_number,
                    etag: trim_etag(&p.e_tag),
                });
            }

            if result.is_truncated {
                marker = result.next_part_number_marker;
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

        let mut body = String::from("<CompleteMultipartUpload>");
        for part in parts {
            body.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
                part.part_number, part.etag
            ));
        }
        body.push_str("</CompleteMultipartUpload>");

        let subresource = format!("uploadId={}", urlencoding::encode(upload_id));
        let resource = canonical_resource(bucket, &key, &subresource);
        let content_type = "application/xml";
        let (authorization, date) = self.auth_headers("POST", "", content_type, &resource);
        let url = self.object_url(bucket, region, &key, &subresource);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .context("阿里云OSS CompleteMultipartUpload 请求失败")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(
                "完成分片上传失败: key={}, upload_id={}, status={}, 响应: {}",
                key, upload_id, status, text
            );
            return Err(anyhow!("完成阿里云OSS分片上传失败: HTTP {}", status));
        }

        info!("分片上传合并完成: key={}, parts={}", key, parts.len());
        let expires_at = chrono::Utc::now().timestamp() + self.url_expire_secs as i64;
        Ok(self.presign_url("GET", bucket, region, &key, "", "", expires_at))
    }

    async fn abort_multipart_upload_to_bucket(
        &self,
        upload_id: &str,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);
        let subresource = format!("uploadId={}", urlencoding::encode(upload_id));
        let resource = canonical_resource(bucket, &key, &subresource);
        let (authorization, date) = self.auth_headers("DELETE", "", "", &resource);
        let url = self.object_url(bucket, region, &key, &subresource);

        let resp = self
            .http
            .delete(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .send()
            .await
            .context("阿里云OSS AbortMultipartUpload 请求失败")?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(
                "取消分片上传失败: key={}, upload_id={}, status={}",
                key, upload_id, status
            );
            return Err(anyhow!("取消阿里云OSS分片上传失败: HTTP {}", status));
        }
        Ok(())
    }

    async fn delete_object_from_bucket(
        &self,
        object_key: &str,
        region: &str,
        bucket: &str,
    ) -> Result<()> {
        let key = full_object_key(&self.upload_dir, object_key);
        let resource = canonical_resource(bucket, &key, "");
        let (authorization, date) = self.auth_headers("DELETE", "", "", &resource);
        let url = self.object_url(bucket, region, &key, "");

        let resp = self
            .http
            .delete(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .send()
            .await
            .context("阿里云OSS DeleteObject 请求失败")?;

        // OSS 删除不存在的对象同样返回 204
        if !resp.status().is_success() {
            let status = resp.status();
            error!("删除对象失败: key={}, status={}", key, status);
            return Err(anyhow!("删除阿里云OSS对象失败: HTTP {}", status));
        }
        Ok(())
    }

    async fn get_object(&self, object_key: &str) -> Result<ObjectReader> {
        let key = full_object_key(&self.upload_dir, object_key);
        let resource = canonical_resource(&self.bucket, &key, "");
        let (authorization, date) = self.auth_headers("GET", "", "", &resource);
        let url = self.object_url(&self.bucket, "", &key, "");

        let resp = self
            .http
            .get(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .send()
            .await
            .context("阿里云OSS GetObject 请求失败")?;

        if !resp.status().is_success() {
            let status = resp.status();
            error!("获取对象失败: key={}, status={}", key, status);
            return Err(anyhow!("获取阿里云OSS对象失败: HTTP {}", status));
        }

        let stream = resp
            .bytes_stream()
            .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn get_object_info(&self, object_key: &str) -> Result<u64> {
        let key = full_object_key(&self.upload_dir, object_key);
        let resource = canonical_resource(&self.bucket, &key, "");
        let (authorization, date) = self.auth_headers("HEAD", "", "", &resource);
        let url = self.object_url(&self.bucket, "", &key, "");

        let resp = self
            .http
            .head(&url)
            .header("Authorization", authorization)
            .header("Date", date)
            .send()
            .await
            .context("阿里云OSS HeadObject 请求失败")?;

        if !resp.status().is_success() {
            return Err(anyhow!("获取阿里云OSS对象信息失败: HTTP {}", resp.status()));
        }

        let size = resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| anyhow!("获取阿里云OSS对象大小失败: Content-Length 为空"))?;
        Ok(size)
    }

    async fn generate_download_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<(String, Option<i64>)> {
        let key = full_object_key(&self.upload_dir, object_key);

        // 零时长表示「永不过期」：按 OSS 上限 7 天签发，过期时间返回 None
        let never_expires = expires_in.is_zero();
        let effective = if never_expires { MAX_PRESIGN_EXPIRY } else { expires_in };
        let expires_at = chrono::Utc::now().timestamp() + effective.as_secs() as i64;

        let url = self.presign_url("GET", &self.bucket, "", &key, "", "", expires_at);
        if never_expires {
            Ok((url, None))
        } else {
            Ok((url, Some(expires_at)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::StorageConfig;

    fn config(accelerate: TransferAccelerate) -> StorageConfig {
        StorageConfig {
            id: 1,
            name: "aliyun".to_string(),
            storage_type: StorageKind::AliyunOss,
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            endpoint: Some("oss-cn-hangzhou.aliyuncs.com".to_string()),
            bucket: "alpha".to_string(),
            region: Some("cn-hangzhou".to_string()),
            account_id: None,
            upload_dir: "uploads".to_string(),
            url_expire_secs: 86400,
            is_default: true,
            transfer_accelerate: accelerate,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_resolve_host_policy() {
        let s = AliyunOssStorage::new(&config(TransferAccelerate::Off)).unwrap();
        // region 优先于配置端点
        assert_eq!(s.resolve_host("cn-beijing"), "oss-cn-beijing.aliyuncs.com");
        assert_eq!(s.resolve_host(""), "oss-cn-hangzhou.aliyuncs.com");

        let s = AliyunOssStorage::new(&config(TransferAccelerate::Global)).unwrap();
        assert_eq!(s.resolve_host("cn-beijing"), ACCELERATE_ENDPOINT);

        let s = AliyunOssStorage::new(&config(TransferAccelerate::Overseas)).unwrap();
        assert_eq!(s.resolve_host(""), ACCELERATE_OVERSEAS_ENDPOINT);
    }

    #[test]
    fn test_sign_v1_known_vector() {
        // RFC 2202 风格的 HMAC-SHA1 标准测试向量
        let sig = sign_v1("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(sig, "3nybhbi3iqa8ino29wqQcBydtNk=");
    }

    #[test]
    fn test_canonical_resource() {
        assert_eq!(canonical_resource("alpha", "a/b.txt", ""), "/alpha/a/b.txt");
        assert_eq!(
            canonical_resource("alpha", "a.txt", "partNumber=3&uploadId=XYZ"),
            "/alpha/a.txt?partNumber=3&uploadId=XYZ"
        );
    }

    #[test]
    fn test_encode_key_preserves_separators() {
        assert_eq!(encode_key("alice/报告 v1.pdf"), "alice/%E6%8A%A5%E5%91%8A%20v1.pdf");
        assert_eq!(encode_key("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_presign_url_contains_signature_params() {
        let s = AliyunOssStorage::new(&config(TransferAccelerate::Off)).unwrap();
        let url = s.presign_url(
            "PUT",
            "alpha",
            "cn-hangzhou",
            "uploads/a.bin",
            "partNumber=1&uploadId=XYZ",
            "application/octet-stream",
            1_900_000_000,
        );
        assert!(url.starts_with("https://alpha.oss-cn-hangzhou.aliyuncs.com/uploads/a.bin?"));
        assert!(url.contains("partNumber=1"));
        assert!(url.contains("uploadId=XYZ"));
        assert!(url.contains("OSSAccessKeyId=ak"));
        assert!(url.contains("Expires=1900000000"));
        assert!(url.contains("Signature="));
    }

    #[test]
    fn test_parse_list_parts_xml() {
        let xml = r#"
            <ListPartsResult>
                <Bucket>alpha</Bucket>
                <Key>a.bin</Key>
                <UploadId>XYZ</UploadId>
                <IsTruncated>false</IsTruncated>
                <Part><PartNumber>2</PartNumber><ETag>"etag2"</ETag><Size>1024</Size></Part>
                <Part><PartNumber>1</PartNumber><ETag>"etag1"</ETag><Size>1024</Size></Part>
            </ListPartsResult>
        "#;
        let result: ListPartsResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(result.part.len(), 2);
        assert!(!result.is_truncated);
        assert_eq!(result.part[0].part_number, 2);
        assert_eq!(result.part[0].e_tag, "\"etag2\"");
    }

    #[test]
    fn test_parse_init_multipart_xml() {
        let xml = r#"
            <InitiateMultipartUploadResult>
                <Bucket>alpha</Bucket>
                <Key>a.bin</Key>
                <UploadId>0004B9894A22E5B1888A1E29F823</UploadId>
            </InitiateMultipartUploadResult>
        "#;
        let result: InitiateMultipartUploadResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(result.upload_id, "0004B9894A22E5B1888A1E29F823");
    }
}
