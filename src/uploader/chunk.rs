//! 分片读取
//!
//! 分片数与分片大小计算，以及带超时重试的分片读取。
//! 读取失败最多重试 10 次，线性退避（第 n 次重试前等待 n 秒）；
//! 到达流尾（EOF）不算错误，返回实际读到的字节。

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// 默认分片上传阈值: 100MB
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 100 * 1024 * 1024;

/// 默认分片大小: 10MB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// 默认分片读取超时: 5 分钟
pub const DEFAULT_CHUNK_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// 分片读取最大重试次数
pub const MAX_READ_RETRIES: u32 = 10;

/// 计算总分片数（向上取整）
pub fn total_chunks(total_size: u64, chunk_size: u64) -> usize {
    // 分片大小为 0 视为不分片（上层参数校验兜底）
    if chunk_size == 0 {
        return 0;
    }
    // 整除时恰好 N 片，否则多出一个余量片
    total_size.div_ceil(chunk_size) as usize
}

/// 计算当前分片大小（末片为余量）
pub fn current_chunk_size(total_size: u64, chunk_size: u64, uploaded: u64) -> u64 {
    // 剩余不足一个整片时，取剩余字节数
    if uploaded + chunk_size > total_size {
        total_size - uploaded
    } else {
        chunk_size
    }
}

/// 尽量填满缓冲区；到达 EOF 提前返回
///
/// 已读字节数通过 `filled` 外部计数器提交，
/// 调用方在超时取消后重试时不会丢失已落入缓冲区的字节
async fn read_full_tracked<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    filled: &mut usize,
) -> std::io::Result<()> {
    while *filled < buf.len() {
        // 从上次提交的位置继续填充
        let n = reader.read(&mut buf[*filled..]).await?;
        if n == 0 {
            // EOF：尾部短读可接受
            return Ok(());
        }
        // 每次读取完成立即提交计数；本次 await 被超时取消不影响已提交部分
        *filled += n;
    }
    Ok(())
}

/// 读取一个分片，带超时与重试
///
/// # 参数
/// * `size` - 期望读取的分片大小
/// * `read_timeout` - 单次尝试的墙钟超时
/// * `part_number` - 仅用于日志
///
/// # 返回
/// 实际读到的字节（尾片可能小于 size；空 Vec 表示流已结束）
pub async fn read_chunk_with_retry<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: u64,
    read_timeout: Duration,
    part_number: u32,
) -> Result<Vec<u8>> {
    // 缓冲区跨重试复用，filled 记录已落入缓冲区的字节数
    let mut buf = vec![0u8; size as usize];
    let mut filled = 0usize;
    let mut last_err: Option<std::io::Error> = None;

    for retry in 0..MAX_READ_RETRIES {
        if retry > 0 {
            warn!(
                "重试读取分片数据: part_number={}, retry={}, 已读={}字节",
                part_number, retry, filled
            );
            // 线性退避：第 n 次重试前等待 n 秒
            tokio::time::sleep(Duration::from_secs(retry as u64)).await;
        }

        // 单次尝试受墙钟超时约束
        match tokio::time::timeout(read_timeout, read_full_tracked(reader, &mut buf, &mut filled))
            .await
        {
            Ok(Ok(())) => {
                // 读满或到达 EOF；截掉未填充的尾部
                buf.truncate(filled);
                return Ok(buf);
            }
            Ok(Err(e)) => {
                // IO 错误：记录后进入下一轮重试
                warn!("读取分片数据失败: part_number={}, 错误: {}", part_number, e);
                last_err = Some(e);
            }
            Err(_) => {
                // 超时：已提交到 filled 的字节保留，下次尝试从断点续读
                warn!(
                    "读取分片数据超时: part_number={}, timeout={:?}",
                    part_number, read_timeout
                );
            }
        }
    }

    // 重试耗尽：有 IO 错误报错误，否则报超时
    match last_err {
        Some(e) => Err(anyhow!("读取分片数据失败: {}", e)),
        None => Err(anyhow!("读取分片数据超时")),
    }
}
