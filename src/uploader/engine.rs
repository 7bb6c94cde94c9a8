//! 上传引擎
//!
//! 核心功能：
//! 1. 按负载大小选择单次 / 分片上传路径
//! 2. 分片路径：串行读取 + Semaphore 有界并发分片 PUT
//! 3. 断点续传：接受已上传的连续分片前缀，跳过对应字节
//! 4. 失败清理：尽力而为 Abort，绝不掩盖原始错误
//!
//! 并发模型：
//! - 读循环单线程推进，worker 通过 JoinSet 管理
//! - 首个 worker 错误写入单槽错误位，读循环在下一轮检测后停止派发
//! - 所有 worker 汇合后才执行 Abort 与终态上报

use crate::progress::{ProgressBroker, ProgressReader};
use crate::storage::{ObjectReader, ObjectStorage, Part};
use crate::uploader::chunk::{current_chunk_size, read_chunk_with_retry, total_chunks};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 分片 PUT 最大重试次数
const PART_PUT_RETRIES: u32 = 3;

/// 单次分片 PUT 请求超时
const PART_PUT_TIMEOUT: Duration = Duration::from_secs(30);

/// 断点续传参数
#[derive(Debug, Clone)]
pub struct ResumeParams {
    /// 既有会话的 upload_id
    pub upload_id: String,
}

/// 上传参数
#[derive(Debug, Clone)]
pub struct UploadParams {
    /// 进度任务ID
    pub task_id: String,
    /// 对象键（已完成推导与清洗）
    pub object_key: String,
    /// 地域代码
    pub region: String,
    /// 目标桶
    pub bucket: String,
    /// 总字节数
    pub total_size: u64,
    /// 分片阈值
    pub chunk_threshold: u64,
    /// 分片大小
    pub chunk_size: u64,
    /// 分片并发数
    pub concurrency: usize,
    /// 分片读取超时
    pub read_timeout: Duration,
    /// 断点续传（携带既有 upload_id）
    pub resume: Option<ResumeParams>,
}

/// 上传引擎
pub struct UploadEngine {
    storage: Arc<dyn ObjectStorage>,
    broker: ProgressBroker,
    /// 分片 PUT 专用 HTTP 客户端
    http: reqwest::Client,
}

impl UploadEngine {
    pub fn new(storage: Arc<dyn ObjectStorage>, broker: ProgressBroker) -> Self {
        Self {
            storage,
            broker,
            http: reqwest::Client::new(),
        }
    }

    /// 执行上传，返回下载URL
    ///
    /// 负载不超过阈值走单次路径，否则走分片路径
    pub async fn upload(&self, reader: ObjectReader, params: UploadParams) -> Result<String> {
        if params.total_size <= params.chunk_threshold {
            info!(
                "使用简单上传: task_id={}, size={}, threshold={}",
                params.task_id, params.total_size, params.chunk_threshold
            );
            self.simple_upload(reader, &params).await
        } else {
            info!(
                "使用分片上传: task_id={}, size={}, threshold={}",
                params.task_id, params.total_size, params.chunk_threshold
            );
            self.multipart_upload(reader, &params).await
        }
    }

    /// 单次上传路径
    async fn simple_upload(&self, reader: ObjectReader, params: &UploadParams) -> Result<String> {
        // 字节模式进度任务
        self.broker.start(&params.task_id, params.total_size);

        // SDK 消费字节时直通进度管理器
        let broker = self.broker.clone();
        let task_id = params.task_id.clone();
        let on_progress: crate::storage::ProgressFn = Arc::new(move |consumed, _total| {
            broker.update(&task_id, consumed);
        });

        match self
            .storage
            .upload_to_bucket_with_progress(
                reader,
                params.total_size,
                &params.object_key,
                &params.region,
                &params.bucket,
                on_progress,
            )
            .await
        {
            Ok(url) => {
                // 成功：终态广播后由宽限窗口回收任务
                self.broker.finish(&params.task_id);
                Ok(url)
            }
            Err(e) => {
                // 失败：置终态 failed，由调用方映射为存储错误码
                self.broker.fail(&params.task_id, "上传文件失败");
                Err(e)
            }
        }
    }

    /// 分片上传路径
    async fn multipart_upload(&self, reader: ObjectReader, params: &UploadParams) -> Result<String> {
        let chunk_size = params.chunk_size;
        let total_size = params.total_size;
        // 1. 计算总分片数（向上取整）
        let chunks = total_chunks(total_size, chunk_size);

        // 2. 续传沿用既有会话，否则初始化新会话
        let upload_id = match &params.resume {
            Some(resume) => resume.upload_id.clone(),
            None => {
                let (id, _urls) = self
                    .storage
                    .init_multipart_upload_to_bucket(&params.object_key, &params.region, &params.bucket)
                    .await
                    .context("初始化分片上传失败")?;
                id
            }
        };

        info!(
            "开始分片上传: task_id={}, object_key={}, total_size={}, chunk_size={}, total_chunks={}, concurrency={}",
            params.task_id, params.object_key, total_size, chunk_size, chunks, params.concurrency
        );

        // 3. 分片模式进度任务
        self.broker
            .start_with_chunks(&params.task_id, total_size, chunk_size, chunks);

        // 4. 请求体包装：进度上报 -> 按分片大小缓冲
        let progress_reader = ProgressReader::new(self.broker.clone(), &params.task_id, reader);
        let mut buffered = BufReader::with_capacity(chunk_size as usize, progress_reader);

        // 已完成分片列表（worker 并发追加，Complete 前统一排序）
        let parts: Arc<Mutex<Vec<Part>>> = Arc::new(Mutex::new(Vec::new()));
        // 单槽错误位：保留首个 worker 错误
        let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

        let mut uploaded_bytes: u64 = 0;
        let mut part_number: u32 = 1;

        // 5. 续传：接受从 1 开始连续的已上传分片，跳过对应字节
        if params.resume.is_some() {
            match self
                .storage
                .list_uploaded_parts_to_bucket(&params.object_key, &upload_id, &params.region, &params.bucket)
                .await
            {
                Ok(existing) if !existing.is_empty() => {
                    info!("继续未完成的分片上传: existing_parts={}", existing.len());
                    for p in existing {
                        // 只接受连续前缀，出现空洞即停止跳过
                        if p.part_number != part_number {
                            break;
                        }
                        // 该分片对应的字节数（末片为余量）
                        let size = current_chunk_size(total_size, chunk_size, uploaded_bytes);
                        // 丢弃拷贝：把请求体里对应的字节排掉
                        let mut take = (&mut buffered).take(size);
                        let skipped = tokio::io::copy(&mut take, &mut tokio::io::sink())
                            .await
                            .context("跳过已上传分片失败")?;
                        if skipped != size {
                            // 请求体比声明的短，续传无法对齐
                            return Err(anyhow!(
                                "跳过已上传分片失败: 期望 {} 字节, 实际 {}",
                                size,
                                skipped
                            ));
                        }
                        // 已上传的分片直接计入进度和分片列表
                        self.broker.update_chunk(&params.task_id, p.part_number as usize, true);
                        parts.lock().push(p);
                        uploaded_bytes += size;
                        part_number += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // 列举失败不阻断：所有分片重新上传即可
                    warn!("列举已上传分片失败，按全新会话处理: {}", e);
                }
            }
        }

        // 信号量限定在途分片数，JoinSet 管理 worker 生命周期
        let semaphore = Arc::new(Semaphore::new(params.concurrency.max(1)));
        let mut join_set: JoinSet<()> = JoinSet::new();

        // 6. 读循环：串行读取分片，派发给有界 worker 池
        while uploaded_bytes < total_size && part_number as usize <= chunks {
            // 任一 worker 报错即停止派发（提前取消）
            if first_error.lock().is_some() {
                break;
            }

            // 当前分片大小（末片为余量）
            let size = current_chunk_size(total_size, chunk_size, uploaded_bytes);
            debug!(
                "准备上传分片: part_number={}, chunk_size={}, uploaded_bytes={}",
                part_number, size, uploaded_bytes
            );

            // 读取一个分片（带超时与重试）
            let data = match read_chunk_with_retry(
                &mut buffered,
                size,
                params.read_timeout,
                part_number,
            )
            .await
            {
                Ok(data) => data,
                Err(e) => {
                    // 不可恢复的读错误：记入错误位，走统一失败路径
                    set_first_error(&first_error, e.context("读取分片数据失败"));
                    break;
                }
            };

            if data.is_empty() {
                // 流已结束
                break;
            }

            let cur_part = part_number;
            uploaded_bytes += data.len() as u64;
            part_number += 1;

            // 池满时在此等待，保持读循环与派发同步
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // 克隆 worker 所需数据
            let storage = Arc::clone(&self.storage);
            let http = self.http.clone();
            let broker = self.broker.clone();
            let parts = Arc::clone(&parts);
            let first_error = Arc::clone(&first_error);
            let task_id = params.task_id.clone();
            let object_key = params.object_key.clone();
            let region = params.region.clone();
            let bucket = params.bucket.clone();
            let upload_id_cloned = upload_id.clone();

            // 7. worker：取签名URL -> PUT 分片 -> 记录 ETag
            join_set.spawn(async move {
                // 许可随 worker 存活，退出时自动归还
                let _permit = permit;

                // 为当前分片生成一次性预签名 PUT URL
                let url = match storage
                    .generate_part_upload_url(&object_key, &upload_id_cloned, cur_part, &region, &bucket)
                    .await
                {
                    Ok(url) => url,
                    Err(e) => {
                        set_first_error(
                            &first_error,
                            e.context(format!("获取分片 {} 上传URL失败", cur_part)),
                        );
                        return;
                    }
                };

                match put_part(&http, &url, data, cur_part).await {
                    Ok(etag) => {
                        // 成功：分片列表加锁追加，分片进度上报
                        parts.lock().push(Part {
                            part_number: cur_part,
                            etag,
                        });
                        broker.update_chunk(&task_id, cur_part as usize, true);
                        debug!("分片上传成功: part_number={}", cur_part);
                    }
                    Err(e) => {
                        // 失败：写入单槽错误位，读循环随后停止派发
                        set_first_error(
                            &first_error,
                            e.context(format!("上传分片 {} 失败", cur_part)),
                        );
                    }
                }
            });
        }

        // 8. 等待所有在途 worker 汇合（等价于 wg.Wait）
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                // worker panic 也按上传失败处理
                set_first_error(&first_error, anyhow!("分片任务异常: {}", e));
            }
        }

        // 任何错误：尽力而为 Abort，任务置失败，返回首个错误
        let failure = first_error.lock().take();
        if let Some(e) = failure {
            self.safe_abort(&upload_id, params).await;
            self.broker.fail(&params.task_id, &e.to_string());
            return Err(e);
        }

        // 9. Complete 要求分片按编号升序；完成顺序不确定，这里统一排序
        let mut sorted_parts = {
            let guard = parts.lock();
            guard.clone()
        };
        sorted_parts.sort_by_key(|p| p.part_number);

        info!(
            "所有分片上传完成，开始合并: upload_id={}, total_parts={}",
            upload_id,
            sorted_parts.len()
        );

        let url = match self
            .storage
            .complete_multipart_upload_to_bucket(
                &params.object_key,
                &upload_id,
                &sorted_parts,
                &params.region,
                &params.bucket,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                // Complete 被拒绝同样走 Abort + 终态失败
                self.safe_abort(&upload_id, params).await;
                self.broker.fail(&params.task_id, "完成分片上传失败");
                return Err(e.context("完成分片上传失败"));
            }
        };

        // 10. 终态广播；文件记录由调用方落库
        self.broker.finish(&params.task_id);
        info!("分片上传完全成功: task_id={}", params.task_id);
        Ok(url)
    }

    /// 尽力而为的 Abort：失败只记日志，不向上传播
    async fn safe_abort(&self, upload_id: &str, params: &UploadParams) {
        if let Err(e) = self
            .storage
            .abort_multipart_upload_to_bucket(upload_id, &params.object_key, &params.region, &params.bucket)
            .await
        {
            warn!(
                "中止分片上传失败，但继续处理: upload_id={}, object_key={}, 错误: {}",
                upload_id, params.object_key, e
            );
        }
    }
}

/// 写入首个错误（已有错误时丢弃后续）
fn set_first_error(slot: &Arc<Mutex<Option<anyhow::Error>>>, e: anyhow::Error) {
    let mut guard = slot.lock();
    if guard.is_none() {
        *guard = Some(e);
    }
}

/// PUT 单个分片到预签名URL
///
/// 最多 3 次尝试，每次 30 秒超时，线性退避；
/// 成功时返回去引号的 ETag
async fn put_part(
    http: &reqwest::Client,
    url: &str,
    data: Vec<u8>,
    part_number: u32,
) -> Result<String> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..PART_PUT_RETRIES {
        if attempt > 0 {
            // 线性退避后重试
            warn!("重试上传分片: part_number={}, retry={}", part_number, attempt);
            tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
        }

        // Content-Type 必须与预签名时覆盖的值一致，否则签名校验失败
        let result = http
            .put(url)
            .timeout(PART_PUT_TIMEOUT)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Length", data.len())
            .body(data.clone())
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                // 网络层错误：可重试
                last_err = Some(anyhow!("分片请求失败: {}", e));
                continue;
            }
        };

        if !resp.status().is_success() {
            // 非 2xx：记下响应体后重试
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            last_err = Some(anyhow!("上传分片失败，状态码: {}, 响应: {}", status, body));
            continue;
        }

        // Complete 接口要求去引号的规范 ETag
        let etag = resp
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        match etag {
            Some(etag) if !etag.is_empty() => return Ok(etag),
            _ => {
                last_err = Some(anyhow!("无法获取分片ETag"));
                continue;
            }
        }
    }

    // 重试耗尽，交回首个/最后的错误
    Err(last_err.unwrap_or_else(|| anyhow!("上传分片失败")))
}
