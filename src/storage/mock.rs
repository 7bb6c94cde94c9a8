//! 测试用内存存储驱动
//!
//! 上传引擎与处理器测试共用：
//! - 单次上传写入内存表
//! - 分片URL指向测试内置的 HTTP 服务（由测试自行拉起）
//! - 可注入 init/complete 失败与预置的已上传分片

use crate::storage::{
    read_all_with_progress, ObjectReader, ObjectStorage, Part, ProgressFn, StorageKind,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MockStorage {
    /// 分片PUT的目标基地址（测试内的本地 HTTP 服务）
    pub part_url_base: Mutex<String>,
    /// 单次上传的内容表 (bucket/key -> bytes)
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    /// list_uploaded_parts 的预置返回
    pub existing_parts: Mutex<Vec<Part>>,
    /// complete 收到的分片序列
    pub completed_parts: Mutex<Option<Vec<Part>>>,
    /// abort 调用次数
    pub abort_calls: AtomicUsize,
    /// 注入 complete 失败
    pub fail_complete: Mutex<bool>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_id(bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    fn name(&self) -> &str {
        "Mock存储"
    }

    fn kind(&self) -> StorageKind {
        StorageKind::AliyunOss
    }

    fn bucket_name(&self) -> &str {
        "mock-bucket"
    }

    async fn upload(&self, data: ObjectReader, size: u64, object_key: &str) -> Result<String> {
        self.upload_to_bucket(data, size, object_key, "", "mock-bucket").await
    }

    async fn upload_to_bucket(
        &self,
        data: ObjectReader,
        size: u64,
        object_key: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<String> {
        let body = read_all_with_progress(data, size, None).await?;
        self.objects
            .lock()
            .insert(Self::object_id(bucket, object_key), body);
        Ok(format!("https://mock/{}/{}", bucket, object_key))
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
        let body = read_all_with_progress(data, size, Some(&on_progress)).await?;
        self.objects
            .lock()
            .insert(Self::object_id(bucket, object_key), body);
        Ok(format!("https://mock/{}/{}", bucket, object_key))
    }

    async fn init_multipart_upload_to_bucket(
        &self,
        _object_key: &str,
        _region: &str,
        _bucket: &str,
    ) -> Result<(String, Vec<String>)> {
        Ok(("mock-upload-id".to_string(), Vec::new()))
    }

    async fn generate_part_upload_url(
        &self,
        _object_key: &str,
        _upload_id: &str,
        part_number: u32,
        _region: &str,
        _bucket: &str,
    ) -> Result<String> {
        let base = self.part_url_base.lock().clone();
        if base.is_empty() {
            return Err(anyhow!("未配置分片URL基地址"));
        }
        Ok(format!("{}/part/{}", base, part_number))
    }

    async fn list_uploaded_parts_to_bucket(
        &self,
        _object_key: &str,
        _upload_id: &str,
        _region: &str,
        _bucket: &str,
    ) -> Result<Vec<Part>> {
        Ok(self.existing_parts.lock().clone())
    }

    async fn complete_multipart_upload_to_bucket(
        &self,
        object_key: &str,
        _upload_id: &str,
        parts: &[Part],
        _region: &str,
        bucket: &str,
    ) -> Result<String> {
        if *self.fail_complete.lock() {
            return Err(anyhow!("注入的 Complete 失败"));
        }
        *self.completed_parts.lock() = Some(parts.to_vec());
        Ok(format!("https://mock/{}/{}", bucket, object_key))
    }

    async fn abort_multipart_upload_to_bucket(
        &self,
        _upload_id: &str,
        _object_key: &str,
        _region: &str,
        _bucket: &str,
    ) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_object_from_bucket(
        &self,
        object_key: &str,
        _region: &str,
        bucket: &str,
    ) -> Result<()> {
        self.objects.lock().remove(&Self::object_id(bucket, object_key));
        Ok(())
    }

    async fn get_object(&self, object_key: &str) -> Result<ObjectReader> {
        let objects = self.objects.lock();
        // 默认桶下查找，便于校验回读一致性
        let body = objects
            .get(&Self::object_id("mock-bucket", object_key))
            .or_else(|| {
                objects
                    .iter()
                    .find(|(k, _)| k.ends_with(&format!("/{}", object_key)))
                    .map(|(_, v)| v)
            })
            .cloned()
            .ok_or_else(|| anyhow!("对象不存在: {}", object_key))?;
        Ok(Box::new(std::io::Cursor::new(body)))
    }

    async fn get_object_info(&self, object_key: &str) -> Result<u64> {
        let objects = self.objects.lock();
        let body = objects
            .iter()
            .find(|(k, _)| k.ends_with(&format!("/{}", object_key)))
            .map(|(_, v)| v)
            .ok_or_else(|| anyhow!("对象不存在: {}", object_key))?;
        Ok(body.len() as u64)
    }

    async fn generate_download_url(
        &self,
        object_key: &str,
        expires_in: Duration,
    ) -> Result<(String, Option<i64>)> {
        let url = format!("https://mock/download/{}", object_key);
        if expires_in.is_zero() {
            Ok((url, None))
        } else {
            Ok((url, Some(chrono::Utc::now().timestamp() + expires_in.as_secs() as i64)))
        }
    }
}
