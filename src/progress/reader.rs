//! 进度上报 Reader
//!
//! 包装任意 AsyncRead，每次读取成功后把累计字节数上报给进度管理器。
//! 分片上传期间它是字节级进度的唯一来源，分片完成事件与之并存
//! （管理器按单调递增合并两路更新）。

use crate::progress::ProgressBroker;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// 进度上报 Reader
pub struct ProgressReader<R> {
    inner: R,
    broker: ProgressBroker,
    task_id: String,
    read: u64,
}

impl<R> ProgressReader<R> {
    pub fn new(broker: ProgressBroker, task_id: impl Into<String>, inner: R) -> Self {
        Self {
            inner,
            broker,
            task_id: task_id.into(),
            read: 0,
        }
    }

    /// 已读取的累计字节数
    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let me = &mut *self;
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    me.read += n as u64;
                    me.broker.update(&me.task_id, me.read);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reports_cumulative_bytes() {
        let broker = ProgressBroker::new();
        broker.start("t1", 10);

        let data: Vec<u8> = (0..10u8).collect();
        let mut reader = ProgressReader::new(broker.clone(), "t1", data.as_slice());

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(reader.bytes_read(), 4);
        assert_eq!(broker.get("t1").unwrap().uploaded, 4);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(reader.bytes_read(), 10);
        assert_eq!(broker.get("t1").unwrap().uploaded, 10);
    }

    #[tokio::test]
    async fn test_unknown_task_is_noop() {
        let broker = ProgressBroker::new();
        let data = vec![0u8; 16];
        let mut reader = ProgressReader::new(broker.clone(), "missing", data.as_slice());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 16);
    }
}
