//! 日志系统
//!
//! 控制台与文件双通道：文件通道按大小滚动，文件名携带本次启动时间戳，
//! 启动时顺带清理超出保留期的旧日志。
//! 文件通道初始化失败只降级为控制台输出，不阻塞服务启动。

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志时间戳格式（控制台与文件共用）
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 按大小滚动的日志写入器
///
/// 同一次启动产生的文件共享一个会话时间戳：
/// `<prefix>.<会话时间戳>.log`、`<prefix>.<会话时间戳>_2.log`、...
pub struct RollingLogWriter {
    state: Arc<Mutex<WriterState>>,
}

struct WriterState {
    dir: PathBuf,
    prefix: String,
    /// 会话时间戳（本次启动固定）
    session: String,
    /// 当前文件序号，从 1 开始
    seq: u32,
    /// 单文件大小上限（字节）
    limit: u64,
    file: File,
    /// 当前文件已写入字节数
    written: u64,
}

impl WriterState {
    fn log_file_name(prefix: &str, session: &str, seq: u32) -> String {
        // 首个文件不带序号后缀
        if seq <= 1 {
            format!("{}.{}.log", prefix, session)
        } else {
            format!("{}.{}_{}.log", prefix, session, seq)
        }
    }

    fn open(dir: &Path, prefix: &str, session: &str, seq: u32) -> io::Result<File> {
        let path = dir.join(Self::log_file_name(prefix, session, seq));
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// 写入前检查容量，超限则切换到下一个序号的文件
    fn roll_if_needed(&mut self, incoming: usize) -> io::Result<()> {
        if self.written + incoming as u64 <= self.limit {
            return Ok(());
        }
        // 旧文件落盘后再切换
        self.file.flush()?;
        self.seq += 1;
        self.file = Self::open(&self.dir, &self.prefix, &self.session, self.seq)?;
        self.written = 0;
        Ok(())
    }
}

impl RollingLogWriter {
    pub fn new(dir: PathBuf, prefix: String, limit: u64) -> io::Result<Self> {
        // 会话时间戳取本地时间，和运维查看日志的习惯一致
        let session = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let file = WriterState::open(&dir, &prefix, &session, 1)?;
        Ok(Self {
            state: Arc::new(Mutex::new(WriterState {
                dir,
                prefix,
                session,
                seq: 1,
                limit,
                file,
                written: 0,
            })),
        })
    }
}

impl Write for RollingLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.roll_if_needed(buf.len())?;
        state.file.write_all(buf)?;
        state.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.file.flush()
    }
}

/// 日志系统守卫
///
/// 持有文件通道的后台写线程，丢弃即停止写入，必须存活到进程结束
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// # Arguments
/// * `config` - 日志配置
///
/// # Returns
/// * `LogGuard` - 需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    // RUST_LOG 优先，未设置时用配置文件的级别
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(true);

    // 文件通道是可选项，任何失败都降级为仅控制台
    let (file_writer, file_guard) = build_file_writer(config)
        .map(|(writer, guard)| (Some(writer), Some(guard)))
        .unwrap_or((None, None));

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            // 文件里不要 ANSI 颜色码
            .with_ansi(false)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_guard.is_some() {
        info!(
            "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
            config.log_dir,
            config.retention_days,
            config.level,
            config.max_file_size as f64 / 1024.0 / 1024.0
        );
        // 顺带清理超过保留期的旧日志
        prune_expired_logs(&config.log_dir, &config.file_prefix, config.retention_days);
    } else {
        info!("日志系统初始化完成（仅控制台输出）");
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

/// 构建文件通道的非阻塞写入器
///
/// 未启用、目录创建失败或文件打开失败都返回 None
fn build_file_writer(config: &LogConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if !config.enabled {
        return None;
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}, 降级为仅控制台输出", config.log_dir, e);
        return None;
    }

    match RollingLogWriter::new(
        config.log_dir.clone(),
        config.file_prefix.clone(),
        config.max_file_size,
    ) {
        Ok(writer) => Some(tracing_appender::non_blocking(writer)),
        Err(e) => {
            eprintln!("打开日志文件失败: {}, 降级为仅控制台输出", e);
            None
        }
    }
}

/// 清理超出保留期的日志文件
fn prune_expired_logs(log_dir: &Path, prefix: &str, retention_days: u32) {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return;
        }
    };

    let mut pruned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        // 只处理本服务、本前缀的日志文件
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(session) = session_stamp(name, prefix) else {
            continue;
        };

        // 优先按文件名里的会话日期判断；解析不出来再看修改时间
        let expired = match session_date(session) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => expired_by_mtime(&entry, retention),
        };

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => {
                    pruned += 1;
                    tracing::debug!("已删除过期日志文件: {:?}", path);
                }
                Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
            }
        }
    }

    if pruned > 0 {
        info!("已清理 {} 个过期日志文件", pruned);
    }
}

/// 取出文件名中的会话时间戳部分
///
/// `gateway.2025-06-01-120000_3.log` -> `2025-06-01-120000`
fn session_stamp<'a>(filename: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = filename
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    // 去掉滚动序号后缀（如有）
    Some(rest.split_once('_').map(|(stamp, _)| stamp).unwrap_or(rest))
}

/// 会话时间戳前 10 位即日期（YYYY-MM-DD）
fn session_date(stamp: &str) -> Option<NaiveDate> {
    let date_part = stamp.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// 按文件修改时间判断是否过期（文件名解析失败时的后备方案）
fn expired_by_mtime(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    let Ok(metadata) = entry.metadata() else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    let modified: chrono::DateTime<chrono::Utc> = modified.into();
    chrono::Utc::now().signed_duration_since(modified) > retention
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_sequence() {
        assert_eq!(
            WriterState::log_file_name("oss-gateway", "2025-06-01-120000", 1),
            "oss-gateway.2025-06-01-120000.log"
        );
        assert_eq!(
            WriterState::log_file_name("oss-gateway", "2025-06-01-120000", 2),
            "oss-gateway.2025-06-01-120000_2.log"
        );
    }

    #[test]
    fn test_session_stamp_extraction() {
        assert_eq!(
            session_stamp("oss-gateway.2025-06-01-120000.log", "oss-gateway"),
            Some("2025-06-01-120000")
        );
        assert_eq!(
            session_stamp("oss-gateway.2025-06-01-120000_3.log", "oss-gateway"),
            Some("2025-06-01-120000")
        );
        // 其他服务的文件不认
        assert_eq!(session_stamp("other.2025-06-01-120000.log", "oss-gateway"), None);
        assert_eq!(session_stamp("oss-gateway.tmp", "oss-gateway"), None);
    }

    #[test]
    fn test_session_date_parsing() {
        assert_eq!(
            session_date("2025-06-01-120000"),
            NaiveDate::from_ymd_opt(2025, 6, 1)
        );
        assert_eq!(session_date("garbage"), None);
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
        assert_eq!(config.file_prefix, "oss-gateway");
    }
}
