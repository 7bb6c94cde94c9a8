use axum::{
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use oss_gateway_rust::{
    auth, logging,
    server::{handlers, state::ClientAddr},
    AppConfig, AppState,
};
use serde::Serialize;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载配置，失败时使用默认配置
    let config = AppConfig::load_or_default("config/app.toml").await;

    // 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("OSS Gateway Rust v0.3.0 启动中...");

    // 创建应用状态（数据库建表、存储工厂、进度管理器都在这里完成装配）
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config)?;
    info!("应用状态初始化完成");

    // 配置中间件层
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // API 路由
    let api_routes = Router::new()
        // 文件API
        .route("/oss/files", post(handlers::upload))
        .route("/oss/files", get(handlers::list_files))
        .route("/oss/files/check-duplicate", get(handlers::check_duplicate))
        .route("/oss/files/:id", delete(handlers::delete_file))
        .route("/oss/files/:id/download", get(handlers::download_url))
        // 分片上传会话API
        .route("/oss/multipart/init", post(handlers::init_multipart))
        .route("/oss/multipart/complete", post(handlers::complete_multipart))
        .route("/oss/multipart/abort", delete(handlers::abort_multipart))
        .route("/oss/multipart/parts", get(handlers::list_parts))
        // 存储配置API
        .route("/oss/configs", get(handlers::list_configs))
        .route("/oss/configs/:id/default", put(handlers::set_default_config))
        // 上传进度API（SSE）
        .route("/uploads/init", post(handlers::init_progress))
        .route("/uploads/:id/progress", get(handlers::get_progress))
        .route("/uploads/:id/stream", get(handlers::stream_progress))
        .with_state(app_state.clone())
        // JWT 认证中间件覆盖所有 API 路由
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::auth_middleware,
        ));

    // 健康检查响应结构
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
        service: String,
    }

    // 健康检查处理器
    async fn health_check() -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "ok".to_string(),
            service: "oss-gateway-rust".to_string(),
        })
    }

    // 构建完整应用
    let app = Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(middleware_stack);

    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("进度推送(SSE): http://{}/api/v1/uploads/:id/stream", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // 仅 HTTP/1.1 的接入循环：SSE 经中间层转发时 HTTP/2 升级会破坏
    // 长连接语义，这里直接用 http1 连接构建器，使 h2 在结构上不可达
    loop {
        tokio::select! {
            // 接受新连接
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // 单个 accept 失败不影响监听循环
                        warn!("接受连接失败: {}", e);
                        continue;
                    }
                };

                // 每个连接独立任务处理，路由器整体克隆（内部为 Arc，开销极小）
                let app = app.clone();
                tokio::spawn(async move {
                    // Tokio 流适配为 hyper IO
                    let io = TokioIo::new(stream);
                    let service = hyper::service::service_fn(
                        move |mut req: hyper::Request<hyper::body::Incoming>| {
                            // 注入对端地址，供处理器提取上传者IP
                            req.extensions_mut().insert(ClientAddr(remote_addr));
                            // 每个请求走一次性的 tower 服务调用
                            app.clone().oneshot(req)
                        },
                    );

                    // keep-alive 开启：同一连接上可跑 SSE 长流
                    if let Err(e) = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(io, service)
                        .await
                    {
                        // 客户端提前断开属于常态（SSE 断连等）
                        debug!("连接处理结束: {}", e);
                    }
                });
            }
            // 退出信号：停止接受新连接
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl+C，开始优雅关闭...");
                break;
            }
        }
    }

    // 在途连接由各自任务自然收尾
    info!("应用已安全退出");
    Ok(())
}
