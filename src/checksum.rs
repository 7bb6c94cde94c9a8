//! MD5 后台计算
//!
//! 上传落库后触发的独立子系统：回读对象流式计算 MD5，
//! 状态机 PENDING -> CALCULATING -> COMPLETED | FAILED。
//! 计算失败只影响 md5_status，不影响上传结果。

use crate::db::models::Md5Status;
use crate::db::FileRecordStore;
use crate::storage::ObjectStorage;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// 触发后台 MD5 计算
pub fn spawn_md5_calculation(
    storage: Arc<dyn ObjectStorage>,
    store: FileRecordStore,
    file_id: i64,
    object_key: String,
) {
    tokio::spawn(async move {
        if let Err(e) = calculate(storage, &store, file_id, &object_key).await {
            warn!("MD5计算失败: file_id={}, object_key={}, 错误: {}", file_id, object_key, e);
            if let Err(e) = store.update_md5(file_id, None, Md5Status::Failed) {
                warn!("标记MD5失败状态出错: file_id={}, 错误: {}", file_id, e);
            }
        }
    });
}

async fn calculate(
    storage: Arc<dyn ObjectStorage>,
    store: &FileRecordStore,
    file_id: i64,
    object_key: &str,
) -> Result<()> {
    store
        .update_md5(file_id, None, Md5Status::Calculating)
        .context("标记MD5计算中失败")?;

    let mut reader = storage
        .get_object(object_key)
        .await
        .context("回读对象失败")?;

    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).await.context("读取对象内容失败")?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }

    let digest = format!("{:x}", ctx.compute());
    store
        .update_md5(file_id, Some(&digest), Md5Status::Completed)
        .context("写入MD5结果失败")?;

    info!("MD5计算完成: file_id={}, md5={}", file_id, digest);
    Ok(())
}
