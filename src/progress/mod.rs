//! 上传进度模块
//!
//! 进程级单例，跟踪每个上传任务的字节/分片进度，
//! 并向所有订阅者做非阻塞扇出：
//! - 订阅通道有界（容量 10），满时丢弃本次快照而不是阻塞生产者
//!   （进度是幂等快照，丢几帧无影响）
//! - 终态（completed/failed）广播后保留一个宽限窗口再回收任务，
//!   晚到的订阅者仍能拿到终态快照

pub mod reader;

pub use reader::ProgressReader;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// 订阅通道容量
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 10;

/// 终态后任务保留时长（晚到订阅者的宽限窗口）
pub const FINISH_GRACE: Duration = Duration::from_secs(5);

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadProgressStatus {
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

/// 分片进度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkProgress {
    /// 分片编号（1..N）
    pub chunk_number: usize,
    /// 分片大小（字节，末片为余量）
    pub chunk_size: u64,
    /// 是否已上传
    pub uploaded: bool,
}

/// 进度快照（SSE progress 事件的负载）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadProgress {
    /// 任务ID
    pub id: String,
    /// 总字节数
    pub total: u64,
    /// 已上传字节数
    pub uploaded: u64,
    /// 进度百分比 (0-100)
    pub percentage: f64,
    /// 瞬时速度 (bytes/s)
    pub speed: u64,
    /// 任务状态
    pub status: UploadProgressStatus,
    /// 失败原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 总分片数（分片模式）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// 已完成分片数（分片模式）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_chunks: Option<usize>,
    /// 开始时间 (Unix timestamp)
    pub started_at: i64,
    /// 最后更新时间 (Unix timestamp)
    pub updated_at: i64,
}

/// 订阅句柄
///
/// 持有接收端；`subscriber_id` 用于显式退订
pub struct Subscription {
    pub subscriber_id: u64,
    pub receiver: mpsc::Receiver<UploadProgress>,
}

/// 任务内部状态
struct TaskEntry {
    progress: UploadProgress,
    /// 分片明细（分片模式才有）
    chunks: Option<Vec<ChunkProgress>>,
    /// 上次字节推进时刻（速度计算基准）
    last_advance: Instant,
    /// 订阅者（id -> 发送端）
    subscribers: HashMap<u64, mpsc::Sender<UploadProgress>>,
}

impl TaskEntry {
    /// 非阻塞扇出：通道满丢弃本帧，通道关闭剔除订阅者
    fn broadcast(&mut self) {
        let snapshot = self.progress.clone();
        self.subscribers.retain(|_, tx| {
            match tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// 进度管理器
///
/// 单把读写锁保护任务表与订阅者集合；
/// 生产者只在状态变更 + try_send 扇出期间短暂持有写锁
#[derive(Clone)]
pub struct ProgressBroker {
    tasks: Arc<RwLock<HashMap<String, TaskEntry>>>,
    next_subscriber_id: Arc<RwLock<u64>>,
    grace: Duration,
}

impl Default for ProgressBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self::with_grace(FINISH_GRACE)
    }

    /// 指定终态宽限窗口（测试用短窗口）
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: Arc::new(RwLock::new(1)),
            grace,
        }
    }

    /// 创建进度任务（字节模式）
    pub fn start(&self, id: &str, total: u64) {
        self.insert_task(id, total, None);
    }

    /// 创建进度任务（分片模式）
    pub fn start_with_chunks(&self, id: &str, total: u64, chunk_size: u64, total_chunks: usize) {
        let chunks = (1..=total_chunks)
            .map(|n| ChunkProgress {
                chunk_number: n,
                // 末片为余量（total 恰好整除时仍是整片）
                chunk_size: if n == total_chunks && total % chunk_size != 0 {
                    total % chunk_size
                } else {
                    chunk_size
                },
                uploaded: false,
            })
            .collect();
        self.insert_task(id, total, Some(chunks));
    }

    fn insert_task(&self, id: &str, total: u64, chunks: Option<Vec<ChunkProgress>>) {
        let now = chrono::Utc::now().timestamp();
        let total_chunks = chunks.as_ref().map(|c| c.len());
        let entry = TaskEntry {
            progress: UploadProgress {
                id: id.to_string(),
                total,
                uploaded: 0,
                percentage: 0.0,
                speed: 0,
                status: UploadProgressStatus::Uploading,
                error: None,
                total_chunks,
                completed_chunks: chunks.as_ref().map(|_| 0),
                started_at: now,
                updated_at: now,
            },
            chunks,
            last_advance: Instant::now(),
            subscribers: HashMap::new(),
        };

        let mut tasks = self.tasks.write();
        tasks.insert(id.to_string(), entry);
        debug!("进度任务创建: id={}, total={}", id, total);
    }

    /// 更新已上传字节数
    ///
    /// 单调递增：小于当前值的更新被忽略；未知任务为空操作。
    /// 速度只在字节推进时重算：(新字节-旧字节)/(当前时刻-上次推进时刻)
    pub fn update(&self, id: &str, uploaded: u64) {
        let mut tasks = self.tasks.write();
        let Some(entry) = tasks.get_mut(id) else {
            return;
        };
        if uploaded <= entry.progress.uploaded {
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(entry.last_advance).as_secs_f64();
        if elapsed > 0.0 {
            let delta = uploaded - entry.progress.uploaded;
            entry.progress.speed = (delta as f64 / elapsed) as u64;
        }
        entry.last_advance = now;

        // 不变式：uploaded <= total（total 未知时不截断）
        let uploaded = if entry.progress.total > 0 {
            uploaded.min(entry.progress.total)
        } else {
            uploaded
        };
        entry.progress.uploaded = uploaded;
        entry.progress.percentage = percentage(uploaded, entry.progress.total);
        entry.progress.updated_at = chrono::Utc::now().timestamp();
        entry.broadcast();
    }

    /// 更新分片完成状态
    ///
    /// 已上传字节数按「已完成分片大小之和」精确重算（含末片余量）
    pub fn update_chunk(&self, id: &str, chunk_number: usize, uploaded: bool) {
        let mut tasks = self.tasks.write();
        let Some(entry) = tasks.get_mut(id) else {
            return;
        };
        let Some(chunks) = entry.chunks.as_mut() else {
            return;
        };
        let Some(chunk) = chunks.iter_mut().find(|c| c.chunk_number == chunk_number) else {
            return;
        };
        chunk.uploaded = uploaded;

        let completed: usize = chunks.iter().filter(|c| c.uploaded).count();
        let uploaded_bytes: u64 = chunks.iter().filter(|c| c.uploaded).map(|c| c.chunk_size).sum();

        let now = Instant::now();
        if uploaded_bytes > entry.progress.uploaded {
            let elapsed = now.duration_since(entry.last_advance).as_secs_f64();
            if elapsed > 0.0 {
                let delta = uploaded_bytes - entry.progress.uploaded;
                entry.progress.speed = (delta as f64 / elapsed) as u64;
            }
            entry.last_advance = now;
            entry.progress.uploaded = uploaded_bytes;
        }

        entry.progress.completed_chunks = Some(completed);
        entry.progress.percentage = percentage(entry.progress.uploaded, entry.progress.total);
        entry.progress.updated_at = chrono::Utc::now().timestamp();
        entry.broadcast();
    }

    /// 任务完成
    ///
    /// 百分比强制 100、字节补齐到 total，广播终态快照；
    /// 宽限窗口之后回收任务与订阅通道
    pub fn finish(&self, id: &str) {
        {
            let mut tasks = self.tasks.write();
            let Some(entry) = tasks.get_mut(id) else {
                return;
            };
            entry.progress.status = UploadProgressStatus::Completed;
            entry.progress.uploaded = entry.progress.total;
            entry.progress.percentage = 100.0;
            if let Some(total) = entry.progress.total_chunks {
                entry.progress.completed_chunks = Some(total);
            }
            entry.progress.updated_at = chrono::Utc::now().timestamp();
            entry.broadcast();
        }
        self.schedule_removal(id);
        debug!("进度任务完成: id={}", id);
    }

    /// 任务失败
    pub fn fail(&self, id: &str, reason: &str) {
        {
            let mut tasks = self.tasks.write();
            let Some(entry) = tasks.get_mut(id) else {
                return;
            };
            entry.progress.status = UploadProgressStatus::Failed;
            entry.progress.error = Some(reason.to_string());
            entry.progress.updated_at = chrono::Utc::now().timestamp();
            entry.broadcast();
        }
        self.schedule_removal(id);
        debug!("进度任务失败: id={}, 原因: {}", id, reason);
    }

    /// 宽限窗口后移除任务（移除即丢弃发送端，订阅通道随之关闭）
    fn schedule_removal(&self, id: &str) {
        let tasks = Arc::clone(&self.tasks);
        let id = id.to_string();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tasks.write().remove(&id);
        });
    }

    /// 查询当前快照
    pub fn get(&self, id: &str) -> Option<UploadProgress> {
        self.tasks.read().get(id).map(|e| e.progress.clone())
    }

    /// 订阅任务进度
    ///
    /// 任务存在时立即投递一帧当前快照；任务不存在时返回的通道已关闭
    pub fn subscribe(&self, id: &str) -> Subscription {
        let subscriber_id = {
            let mut next = self.next_subscriber_id.write();
            let sid = *next;
            *next += 1;
            sid
        };

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        let mut tasks = self.tasks.write();
        if let Some(entry) = tasks.get_mut(id) {
            let _ = tx.try_send(entry.progress.clone());
            entry.subscribers.insert(subscriber_id, tx);
        }
        // 任务不存在：发送端在此被丢弃，订阅方读到关闭的通道

        Subscription {
            subscriber_id,
            receiver: rx,
        }
    }

    /// 退订（重复调用安全）
    pub fn unsubscribe(&self, id: &str, subscriber_id: u64) {
        let mut tasks = self.tasks.write();
        if let Some(entry) = tasks.get_mut(id) {
            entry.subscribers.remove(&subscriber_id);
        }
    }

    /// 当前存活任务数（监控用）
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }
}

fn percentage(uploaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (uploaded as f64 / total as f64 * 100.0).min(100.0)
}
