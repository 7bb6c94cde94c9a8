//! 上传进度API处理器
//!
//! SSE 流式推送约定：
//! - 建立连接即发 connected 事件
//! - 每次进度变更发 progress 事件
//! - 每 10 秒发 heartbeat 事件防止中间层断连
//! - 任务回收（通道关闭）时发 complete 事件并结束流
//!
//! 响应头禁用中间层缓冲（X-Accel-Buffering: no），配合 HTTP/1.1 传输

use crate::server::error::{ok, ApiError, ApiResult};
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::http::{header, HeaderValue};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

/// 心跳间隔
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct InitProgressRequest {
    #[serde(default)]
    pub total: u64,
}

/// 创建进度任务
///
/// POST /api/v1/uploads/init
pub async fn init_progress(
    State(state): State<AppState>,
    Json(req): Json<InitProgressRequest>,
) -> ApiResult<serde_json::Value> {
    let id = Uuid::new_v4().to_string();
    state.broker.start(&id, req.total);
    info!("API: 创建进度任务 id={}, total={}", id, req.total);
    ok(json!({ "id": id }))
}

/// 查询进度快照
///
/// GET /api/v1/uploads/:id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<crate::progress::UploadProgress> {
    match state.broker.get(&id) {
        Some(progress) => ok(progress),
        None => Err(ApiError::not_found("任务不存在")),
    }
}

/// SSE 实时推送进度
///
/// GET /api/v1/uploads/:id/stream
pub async fn stream_progress(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.broker.get(&id).is_none() {
        return ApiError::not_found("任务不存在").into_response();
    }

    let mut sub = state.broker.subscribe(&id);
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);

    let broker = state.broker.clone();
    let task_id = id.clone();
    tokio::spawn(async move {
        // 连接确认
        if let Ok(ev) = Event::default().event("connected").json_data(json!({
            "taskId": task_id,
            "timestamp": chrono::Utc::now().timestamp(),
        })) {
            if tx.send(Ok(ev)).await.is_err() {
                broker.unsubscribe(&task_id, sub.subscriber_id);
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // interval 首个 tick 立即触发，先消费掉
        heartbeat.tick().await;

        loop {
            tokio::select! {
                maybe = sub.receiver.recv() => match maybe {
                    Some(progress) => {
                        let Ok(ev) = Event::default().event("progress").json_data(&progress) else {
                            continue;
                        };
                        if tx.send(Ok(ev)).await.is_err() {
                            // 客户端断开，立即终止推送
                            break;
                        }
                    }
                    None => {
                        // 任务回收：发终止事件后关闭流
                        if let Ok(ev) = Event::default()
                            .event("complete")
                            .json_data(json!({ "taskId": task_id }))
                        {
                            let _ = tx.send(Ok(ev)).await;
                        }
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    let Ok(ev) = Event::default().event("heartbeat").json_data(json!({
                        "timestamp": chrono::Utc::now().timestamp(),
                    })) else {
                        continue;
                    };
                    if tx.send(Ok(ev)).await.is_err() {
                        break;
                    }
                }
            }
        }

        broker.unsubscribe(&task_id, sub.subscriber_id);
        debug!("SSE推送结束: task_id={}", task_id);
    });

    let mut resp = Sse::new(ReceiverStream::new(rx)).into_response();
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // 禁用 Nginx 等反向代理的响应缓冲
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::Database;

    fn test_state() -> AppState {
        let db = Database::open_in_memory().unwrap();
        AppState::with_database(AppConfig::default(), db).unwrap()
    }

    #[tokio::test]
    async fn test_init_and_get_progress() {
        let state = test_state();

        let resp = init_progress(
            State(state.clone()),
            Json(InitProgressRequest { total: 1000 }),
        )
        .await
        .unwrap();
        let id = resp.0.data.as_ref().unwrap()["id"].as_str().unwrap().to_string();

        let snapshot = get_progress(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(snapshot.0.data.as_ref().unwrap().total, 1000);

        let missing = get_progress(State(state), Path("nope".to_string())).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_stream_unknown_task_is_not_found() {
        let state = test_state();
        let resp = stream_progress(State(state), Path("missing".to_string())).await;
        // 业务 404 包在 HTTP 200 信封里
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_headers() {
        let state = test_state();
        state.broker.start("t1", 100);
        let resp = stream_progress(State(state), Path("t1".to_string())).await;

        let headers = resp.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers.get("X-Accel-Buffering").unwrap(), "no");
    }
}
