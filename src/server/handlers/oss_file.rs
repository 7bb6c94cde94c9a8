//! 文件API处理器
//!
//! 上传入口按 Content-Type 智能分流：
//! - multipart/form-data：表单字段 file
//! - 其他：原始流 + X-File-Name / Content-Length 头
//!
//! 两条入口共用同一套引擎编排（do_upload）

use crate::auth::CurrentUser;
use crate::checksum::spawn_md5_calculation;
use crate::db::models::{FileRecord, NewFileRecord, StorageConfig};
use crate::server::error::{ok, ApiError, ApiResult};
use crate::server::state::ClientAddr;
use crate::server::AppState;
use crate::storage::{ObjectReader, Part};
use crate::uploader::{derive_object_key, generate_object_key, UploadEngine, UploadParams};
use crate::uploader::engine::ResumeParams;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{error, info, warn};
use uuid::Uuid;

// =====================================================
// 请求头提取
// =====================================================

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|s| s.parse().ok())
}

/// 客户端IP：代理头优先，回退到连接对端地址
fn client_ip(headers: &HeaderMap, fallback: Option<&ClientAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    if let Some(real_ip) = header_str(headers, "X-Real-IP") {
        return real_ip;
    }
    fallback
        .map(|addr| addr.0.ip().to_string())
        .unwrap_or_default()
}

// =====================================================
// 上传入口
// =====================================================

/// 上传文件 - 智能选择上传方式
///
/// POST /api/v1/oss/files
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    req: Request,
) -> ApiResult<FileRecord> {
    let headers = req.headers().clone();
    let upload_ip = client_ip(&headers, req.extensions().get::<ClientAddr>());

    let content_type = header_str(&headers, CONTENT_TYPE.as_str()).unwrap_or_default();

    if content_type.contains("multipart/form-data") {
        // 表单上传
        let mut multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|_| ApiError::invalid_params("解析表单失败"))?;

        let mut file: Option<(String, Vec<u8>)> = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|_| ApiError::invalid_params("读取表单字段失败"))?
        {
            if field.name() == Some("file") {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::invalid_params("获取文件失败"))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::invalid_params("读取文件内容失败"))?;
                file = Some((filename, data.to_vec()));
                break;
            }
        }

        let (filename, data) = file.ok_or_else(|| ApiError::invalid_params("获取文件失败"))?;
        let total_size = data.len() as u64;
        let reader: ObjectReader = Box::new(std::io::Cursor::new(data));
        do_upload(state, user, headers, upload_ip, filename, total_size, reader).await
    } else {
        // 流式上传
        let filename = header_str(&headers, "X-File-Name")
            .ok_or_else(|| ApiError::invalid_params("请提供文件名（X-File-Name header）"))?;
        let total_size = header_u64(&headers, "Content-Length")
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                ApiError::invalid_params("请提供有效的文件大小（Content-Length header）")
            })?;

        let stream = req
            .into_body()
            .into_data_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader: ObjectReader = Box::new(StreamReader::new(stream));
        do_upload(state, user, headers, upload_ip, filename, total_size, reader).await
    }
}

/// 上传编排：鉴权 -> 键推导 -> 冲突检查 -> 引擎 -> 落库
async fn do_upload(
    state: AppState,
    user: CurrentUser,
    headers: HeaderMap,
    upload_ip: String,
    original_filename: String,
    total_size: u64,
    reader: ObjectReader,
) -> ApiResult<FileRecord> {
    let region_code = header_str(&headers, "region_code")
        .ok_or_else(|| ApiError::invalid_params("请指定 region_code 和 bucket_name"))?;
    let bucket_name = header_str(&headers, "bucket_name")
        .ok_or_else(|| ApiError::invalid_params("请指定 region_code 和 bucket_name"))?;

    let config = state
        .config_store
        .get_default()
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::server_error("获取默认存储配置失败"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &region_code, &bucket_name)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|e| {
            error!("获取存储服务失败: {}", e);
            ApiError::server_error("获取存储服务失败")
        })?;

    let force_overwrite = header_str(&headers, "X-Force-Overwrite").as_deref() == Some("true");

    let custom_path = header_str(&headers, "X-Custom-Path");
    let mut object_key = derive_object_key(custom_path.as_deref(), &user.username, &original_filename)
        .map_err(|_| ApiError::invalid_params("自定义路径包含非法字符"))?;

    // 冲突预检（基于完整路径）
    if !force_overwrite {
        match state.file_store.exists_active(&bucket_name, &object_key) {
            Ok(true) => {
                return Err(ApiError::file_exists(
                    "在相同路径下文件已存在，请确认是否要覆盖",
                ));
            }
            Ok(false) => {}
            Err(e) => {
                error!("检查文件是否存在失败: {}", e);
                return Err(ApiError::server_error("检查文件是否存在失败"));
            }
        }
    }

    // 客户端可自带任务ID用于进度订阅，否则生成新ID
    let task_id = header_str(&headers, "Upload-Task-ID").unwrap_or_else(|| Uuid::new_v4().to_string());

    // 续传：沿用既有会话的对象键与 upload_id
    let resume = match header_str(&headers, "X-Upload-Id") {
        Some(upload_id) => {
            object_key = header_str(&headers, "X-Object-Key")
                .ok_or_else(|| ApiError::invalid_params("续传需要提供 X-Object-Key"))?;
            Some(ResumeParams { upload_id })
        }
        None => None,
    };

    let upload_cfg = &state.config.upload;
    let params = UploadParams {
        task_id: task_id.clone(),
        object_key: object_key.clone(),
        region: region_code.clone(),
        bucket: bucket_name.clone(),
        total_size,
        chunk_threshold: header_u64(&headers, "X-Chunk-Threshold")
            .unwrap_or(upload_cfg.chunk_threshold),
        chunk_size: header_u64(&headers, "X-Chunk-Size")
            .filter(|size| *size > 0)
            .unwrap_or(upload_cfg.chunk_size),
        concurrency: header_u64(&headers, "X-Chunk-Concurrency")
            .filter(|c| *c > 0)
            .map(|c| c as usize)
            .unwrap_or(upload_cfg.chunk_concurrency),
        read_timeout: header_u64(&headers, "X-Chunk-Read-Timeout")
            .filter(|t| *t > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(upload_cfg.chunk_read_timeout_secs)),
        resume,
    };

    let engine = UploadEngine::new(storage.clone(), state.broker.clone());
    let url = engine.upload(reader, params).await.map_err(|e| {
        error!("上传失败: task_id={}, 错误: {:#}", task_id, e);
        ApiError::server_error("上传文件失败")
    })?;

    let record = save_file_record(
        &state,
        &config,
        object_key,
        original_filename,
        total_size,
        bucket_name,
        url,
        user.user_id,
        upload_ip,
    )?;

    // 触发后台MD5计算
    spawn_md5_calculation(
        storage,
        state.file_store.clone(),
        record.id,
        record.object_key.clone(),
    );

    ok(record)
}

/// 保存文件记录（同键旧 ACTIVE 在同一事务内被替换）
#[allow(clippy::too_many_arguments)]
fn save_file_record(
    state: &AppState,
    config: &StorageConfig,
    object_key: String,
    original_filename: String,
    file_size: u64,
    bucket: String,
    download_url: String,
    uploader_id: i64,
    upload_ip: String,
) -> Result<FileRecord, ApiError> {
    let expire_secs = if config.url_expire_secs > 0 {
        config.url_expire_secs
    } else {
        24 * 3600
    };
    let expires_at = chrono::Utc::now().timestamp() + expire_secs as i64;

    let record = state
        .file_store
        .save_uploaded_file(NewFileRecord {
            config_id: config.id,
            filename: object_key.clone(),
            original_filename,
            file_size,
            storage_type: config.storage_type,
            bucket,
            object_key,
            download_url: Some(download_url),
            expires_at: Some(expires_at),
            uploader_id,
            upload_ip,
        })
        .map_err(|e| {
            error!("保存文件记录失败: {}", e);
            ApiError::server_error("保存文件记录失败")
        })?;

    info!(
        "文件记录保存成功: file_id={}, object_key={}, status=ACTIVE",
        record.id, record.object_key
    );
    Ok(record)
}

// =====================================================
// 分片上传会话接口
// =====================================================

#[derive(Debug, Deserialize)]
pub struct InitMultipartRequest {
    pub region_code: String,
    pub bucket_name: String,
    pub file_name: String,
}

/// 初始化分片上传
///
/// POST /api/v1/oss/multipart/init
pub async fn init_multipart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<InitMultipartRequest>,
) -> ApiResult<serde_json::Value> {
    if req.region_code.is_empty() || req.bucket_name.is_empty() || req.file_name.is_empty() {
        return Err(ApiError::invalid_params("参数错误"));
    }

    let config = state
        .config_store
        .get_default()
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::server_error("获取默认存储配置失败"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &req.region_code, &req.bucket_name)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    let ext = std::path::Path::new(&req.file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let object_key = generate_object_key(&user.username, &ext);

    let (upload_id, urls) = storage
        .init_multipart_upload_to_bucket(&object_key, &req.region_code, &req.bucket_name)
        .await
        .map_err(|e| {
            error!("初始化分片上传失败: {}", e);
            ApiError::server_error("初始化分片上传失败")
        })?;

    ok(json!({
        "upload_id": upload_id,
        "object_key": object_key,
        "urls": urls,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteMultipartRequest {
    pub region_code: String,
    pub bucket_name: String,
    pub object_key: String,
    pub upload_id: String,
    pub parts: Vec<String>,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub task_id: String,
}

/// 完成分片上传
///
/// POST /api/v1/oss/multipart/complete
pub async fn complete_multipart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    req: Request,
) -> ApiResult<FileRecord> {
    let headers = req.headers().clone();
    let upload_ip = client_ip(&headers, req.extensions().get::<ClientAddr>());
    let Json(body): Json<CompleteMultipartRequest> = Json::from_request(req, &state)
        .await
        .map_err(|_| ApiError::invalid_params("参数错误"))?;

    if body.region_code.is_empty()
        || body.bucket_name.is_empty()
        || body.object_key.is_empty()
        || body.upload_id.is_empty()
        || body.parts.is_empty()
    {
        return Err(ApiError::invalid_params("参数错误"));
    }

    let config = state
        .config_store
        .get_default()
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::server_error("获取默认存储配置失败"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &body.region_code, &body.bucket_name)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    // 客户端按序提交 etag 列表，编号从 1 开始
    let parts: Vec<Part> = body
        .parts
        .iter()
        .enumerate()
        .map(|(i, etag)| Part {
            part_number: (i + 1) as u32,
            etag: etag.trim_matches('"').to_string(),
        })
        .collect();

    info!(
        "开始完成分片上传: upload_id={}, object_key={}, parts_count={}, task_id={}",
        body.upload_id,
        body.object_key,
        parts.len(),
        body.task_id
    );

    let url = match storage
        .complete_multipart_upload_to_bucket(
            &body.object_key,
            &body.upload_id,
            &parts,
            &body.region_code,
            &body.bucket_name,
        )
        .await
    {
        Ok(url) => url,
        Err(e) => {
            error!("完成分片上传失败: {}", e);
            if !body.task_id.is_empty() {
                state.broker.fail(&body.task_id, "完成分片上传失败");
            }
            return Err(ApiError::server_error("完成分片上传失败"));
        }
    };

    let original_filename = if body.original_filename.is_empty() {
        body.object_key.clone()
    } else {
        body.original_filename.clone()
    };

    let record = save_file_record(
        &state,
        &config,
        body.object_key.clone(),
        original_filename,
        body.file_size,
        body.bucket_name.clone(),
        url,
        user.user_id,
        upload_ip,
    )?;

    if !body.task_id.is_empty() {
        state.broker.finish(&body.task_id);
    }

    spawn_md5_calculation(
        storage,
        state.file_store.clone(),
        record.id,
        record.object_key.clone(),
    );

    ok(record)
}

#[derive(Debug, Deserialize)]
pub struct AbortMultipartRequest {
    pub config_id: i64,
    pub object_key: String,
    pub upload_id: String,
}

/// 取消分片上传
///
/// DELETE /api/v1/oss/multipart/abort
pub async fn abort_multipart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<AbortMultipartRequest>,
) -> ApiResult<()> {
    if req.object_key.is_empty() || req.upload_id.is_empty() {
        return Err(ApiError::invalid_params("参数错误"));
    }

    let config = state
        .config_store
        .get(req.config_id)
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::config_not_found("存储配置不存在"))?;

    let region = config.region.clone().unwrap_or_default();
    if !state
        .access
        .check_bucket_access(user.user_id, &region, &config.bucket)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    storage
        .abort_multipart_upload_to_bucket(&req.upload_id, &req.object_key, &region, &config.bucket)
        .await
        .map_err(|e| {
            warn!("取消分片上传失败: {}", e);
            ApiError::server_error("取消分片上传失败")
        })?;

    Ok(Json(crate::server::error::ApiResponse::<()>::success_empty()))
}

#[derive(Debug, Deserialize)]
pub struct ListPartsQuery {
    #[serde(default)]
    pub region_code: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub object_key: String,
    #[serde(default)]
    pub upload_id: String,
}

/// 获取已上传的分片编号
///
/// GET /api/v1/oss/multipart/parts
pub async fn list_parts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListPartsQuery>,
) -> ApiResult<serde_json::Value> {
    if query.region_code.is_empty()
        || query.bucket_name.is_empty()
        || query.object_key.is_empty()
        || query.upload_id.is_empty()
    {
        return Err(ApiError::invalid_params("参数错误"));
    }

    let config = state
        .config_store
        .get_default()
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::server_error("获取默认存储配置失败"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &query.region_code, &query.bucket_name)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    let parts = storage
        .list_uploaded_parts_to_bucket(
            &query.object_key,
            &query.upload_id,
            &query.region_code,
            &query.bucket_name,
        )
        .await
        .map_err(|e| {
            error!("获取已上传分片失败: {}", e);
            ApiError::server_error("获取已上传分片失败")
        })?;

    let part_numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    ok(json!({ "parts": part_numbers }))
}

// =====================================================
// 查询 / 删除 / 下载
// =====================================================

#[derive(Debug, Deserialize)]
pub struct CheckDuplicateQuery {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub region_code: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub custom_path: Option<String>,
}

/// 检查重复文件
///
/// GET /api/v1/oss/files/check-duplicate
pub async fn check_duplicate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<CheckDuplicateQuery>,
) -> ApiResult<serde_json::Value> {
    if query.filename.is_empty() {
        return Err(ApiError::invalid_params("文件名不能为空"));
    }
    if query.region_code.is_empty() || query.bucket_name.is_empty() {
        return Err(ApiError::invalid_params("请指定 region_code 和 bucket_name"));
    }

    if !state
        .access
        .check_bucket_access(user.user_id, &query.region_code, &query.bucket_name)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let object_key = derive_object_key(
        query.custom_path.as_deref().filter(|p| !p.is_empty()),
        &user.username,
        &query.filename,
    )
    .map_err(|_| ApiError::invalid_params("自定义路径包含非法字符"))?;

    let existing = state
        .file_store
        .find_active(&query.bucket_name, &object_key)
        .map_err(|e| {
            error!("查询文件失败: {}", e);
            ApiError::server_error("查询文件失败")
        })?;

    match existing {
        None => ok(json!({
            "exists": false,
            "object_key": object_key,
            "message": "文件不存在，可以上传",
        })),
        Some(file) => {
            // 提取既有文件的目录部分
            let existing_path = file
                .object_key
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default();

            ok(json!({
                "exists": true,
                "object_key": object_key,
                "existing_file": {
                    "id": file.id,
                    "filename": file.filename,
                    "original_filename": file.original_filename,
                    "file_size": file.file_size,
                    "created_at": file.created_at,
                    "object_key": file.object_key,
                    "path": existing_path,
                },
                "message": "在相同路径下发现同名文件，是否要覆盖？",
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub config_id: Option<i64>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

/// 获取文件列表，相同文件名只返回最新一条
///
/// GET /api/v1/oss/files
pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListFilesQuery>,
) -> ApiResult<serde_json::Value> {
    let buckets = state.access.accessible_buckets(user.user_id, None);

    let (total, items) = state
        .file_store
        .list(&buckets, query.config_id, query.page, query.page_size)
        .map_err(|e| {
            error!("获取文件列表失败: {}", e);
            ApiError::server_error("获取文件列表失败")
        })?;

    ok(json!({ "total": total, "items": items }))
}

/// 删除文件
///
/// DELETE /api/v1/oss/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    let file = state
        .file_store
        .get(id)
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::file_not_found("文件不存在"))?;

    let region = state
        .access
        .region_for_bucket(&file.bucket)
        .ok_or_else(|| ApiError::server_error("获取存储桶区域信息失败"))?;

    let config = state
        .config_store
        .get(file.config_id)
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::config_not_found("存储配置不存在"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &region, &file.bucket)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    storage
        .delete_object_from_bucket(&file.object_key, &region, &file.bucket)
        .await
        .map_err(|e| {
            error!(
                "删除文件失败: object_key={}, region={}, bucket={}, 错误: {}",
                file.object_key, region, file.bucket, e
            );
            ApiError::server_error("删除文件失败")
        })?;

    state.file_store.mark_deleted(file.id).map_err(|e| {
        error!("删除文件记录失败: {}", e);
        ApiError::server_error("删除文件记录失败")
    })?;

    info!(
        "文件删除成功: file_id={}, object_key={}, region={}, bucket={}",
        file.id, file.object_key, region, file.bucket
    );
    Ok(Json(crate::server::error::ApiResponse::<()>::success_empty()))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub expire_hours: Option<i64>,
}

/// 允许的下载链接有效期档位（小时）
const ALLOWED_EXPIRE_HOURS: &[i64] = &[1, 2, 3, 6, 12, 24, 48];

/// 获取文件下载链接
///
/// GET /api/v1/oss/files/:id/download
/// expire_hours 取值 {0,1,2,3,6,12,24,48}，0 表示永不过期
pub async fn download_url(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<serde_json::Value> {
    let file = state
        .file_store
        .get(id)
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::file_not_found("文件不存在"))?;

    // 档位校验：0 为永不过期，非法取值回落到 1 小时
    let (never_expires, expire_hours) = match query.expire_hours {
        Some(0) => (true, 0),
        Some(h) if ALLOWED_EXPIRE_HOURS.contains(&h) => (false, h),
        _ => (false, 1),
    };

    let region = state
        .access
        .region_for_bucket(&file.bucket)
        .ok_or_else(|| ApiError::server_error("获取存储桶区域信息失败"))?;

    let config = state
        .config_store
        .get(file.config_id)
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::config_not_found("存储配置不存在"))?;

    if !state
        .access
        .check_bucket_access(user.user_id, &region, &file.bucket)
    {
        return Err(ApiError::forbidden("没有权限访问该存储桶"));
    }

    let storage = state
        .factory
        .get(config.storage_type)
        .map_err(|_| ApiError::server_error("获取存储服务失败"))?;

    let expires_in = if never_expires {
        Duration::ZERO
    } else {
        Duration::from_secs(expire_hours as u64 * 3600)
    };

    let (url, expires_at) = storage
        .generate_download_url(&file.object_key, expires_in)
        .await
        .map_err(|e| {
            error!("生成下载链接失败: {}", e);
            ApiError::server_error("生成下载链接失败")
        })?;

    info!(
        "生成文件下载链接: file_id={}, object_key={}, never_expires={}, expire_hours={}",
        id, file.object_key, never_expires, expire_hours
    );

    let mut resp = json!({
        "download_url": url,
        "never_expires": never_expires,
    });
    if let Some(ts) = expires_at {
        resp["expires"] = json!(ts);
        resp["expire_hours"] = json!(expire_hours);
    }
    ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::models::TransferAccelerate;
    use crate::db::{Database, StorageConfig};
    use crate::storage::StorageKind;
    use axum::body::Body;
    use rusqlite::params as sql_params;

    fn test_state() -> AppState {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::with_database(AppConfig::default(), db).unwrap();

        // 默认存储配置
        state
            .config_store
            .create(&StorageConfig {
                id: 0,
                name: "aliyun".to_string(),
                storage_type: StorageKind::AliyunOss,
                access_key_id: "ak".to_string(),
                access_key_secret: "sk".to_string(),
                endpoint: Some("oss-cn-hangzhou.aliyuncs.com".to_string()),
                bucket: "alpha".to_string(),
                region: Some("cn-hangzhou".to_string()),
                account_id: None,
                upload_dir: "".to_string(),
                url_expire_secs: 86400,
                is_default: true,
                transfer_accelerate: TransferAccelerate::Off,
                created_at: 0,
                updated_at: 0,
            })
            .unwrap();

        state
    }

    /// 给用户授权 (region, bucket)
    fn grant_access(state: &AppState, user_id: i64, region: &str, bucket: &str) {
        let conn = state.db.conn();
        let conn = conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT OR IGNORE INTO region_bucket_mapping (region_code, bucket_name, created_at) VALUES (?1, ?2, ?3)",
            sql_params![region, bucket, now],
        )
        .unwrap();
        let mapping_id: i64 = conn
            .query_row(
                "SELECT id FROM region_bucket_mapping WHERE bucket_name = ?1",
                sql_params![bucket],
                |r| r.get(0),
            )
            .unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO role_region_bucket_access (role_id, region_bucket_id) VALUES (1, ?1)",
            sql_params![mapping_id],
        )
        .unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, 1)",
            sql_params![user_id],
        )
        .unwrap();
    }

    fn alice() -> CurrentUser {
        CurrentUser {
            user_id: 1,
            username: "alice".to_string(),
        }
    }

    fn raw_upload_request(headers: &[(&str, &str)], body: &[u8]) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/oss/files");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_vec())).unwrap()
    }

    #[tokio::test]
    async fn test_upload_requires_region_and_bucket() {
        let state = test_state();
        let req = raw_upload_request(
            &[("X-File-Name", "a.txt"), ("Content-Length", "4")],
            b"data",
        );
        let err = upload(State(state), Extension(alice()), req).await.unwrap_err();
        assert_eq!(err.code, crate::server::error::CODE_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_upload_denied_without_grant() {
        let state = test_state();
        let req = raw_upload_request(
            &[
                ("X-File-Name", "a.txt"),
                ("Content-Length", "4"),
                ("region_code", "cn-hangzhou"),
                ("bucket_name", "alpha"),
            ],
            b"data",
        );
        let err = upload(State(state), Extension(alice()), req).await.unwrap_err();
        assert_eq!(err.code, crate::server::error::CODE_FORBIDDEN);
    }

    #[tokio::test]
    async fn test_upload_collision_returns_file_exists() {
        let state = test_state();
        grant_access(&state, 1, "cn-hangzhou", "alpha");

        // 预置同键 ACTIVE 记录
        state
            .file_store
            .save_uploaded_file(crate::db::models::NewFileRecord {
                config_id: 1,
                filename: "alice/a.txt".to_string(),
                original_filename: "a.txt".to_string(),
                file_size: 4,
                storage_type: StorageKind::AliyunOss,
                bucket: "alpha".to_string(),
                object_key: "alice/a.txt".to_string(),
                download_url: None,
                expires_at: None,
                uploader_id: 1,
                upload_ip: "127.0.0.1".to_string(),
            })
            .unwrap();

        let req = raw_upload_request(
            &[
                ("X-File-Name", "a.txt"),
                ("Content-Length", "4"),
                ("region_code", "cn-hangzhou"),
                ("bucket_name", "alpha"),
            ],
            b"data",
        );
        let err = upload(State(state), Extension(alice()), req).await.unwrap_err();
        assert_eq!(err.code, crate::server::error::CODE_FILE_EXISTS);
    }

    #[tokio::test]
    async fn test_upload_rejects_illegal_custom_path() {
        let state = test_state();
        grant_access(&state, 1, "cn-hangzhou", "alpha");

        let req = raw_upload_request(
            &[
                ("X-File-Name", "a.txt"),
                ("Content-Length", "4"),
                ("region_code", "cn-hangzhou"),
                ("bucket_name", "alpha"),
                ("X-Custom-Path", "../escape"),
            ],
            b"data",
        );
        let err = upload(State(state), Extension(alice()), req).await.unwrap_err();
        assert_eq!(err.code, crate::server::error::CODE_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_check_duplicate_roundtrip() {
        let state = test_state();
        grant_access(&state, 1, "cn-hangzhou", "alpha");

        // 未上传时不存在
        let resp = check_duplicate(
            State(state.clone()),
            Extension(alice()),
            Query(CheckDuplicateQuery {
                filename: "a.txt".to_string(),
                region_code: "cn-hangzhou".to_string(),
                bucket_name: "alpha".to_string(),
                custom_path: None,
            }),
        )
        .await
        .unwrap();
        let data = resp.0.data.unwrap();
        assert_eq!(data["exists"], false);
        assert_eq!(data["object_key"], "alice/a.txt");

        // 入库后命中
        state
            .file_store
            .save_uploaded_file(crate::db::models::NewFileRecord {
                config_id: 1,
                filename: "alice/a.txt".to_string(),
                original_filename: "a.txt".to_string(),
                file_size: 4,
                storage_type: StorageKind::AliyunOss,
                bucket: "alpha".to_string(),
                object_key: "alice/a.txt".to_string(),
                download_url: None,
                expires_at: None,
                uploader_id: 1,
                upload_ip: "127.0.0.1".to_string(),
            })
            .unwrap();

        let resp = check_duplicate(
            State(state),
            Extension(alice()),
            Query(CheckDuplicateQuery {
                filename: "a.txt".to_string(),
                region_code: "cn-hangzhou".to_string(),
                bucket_name: "alpha".to_string(),
                custom_path: None,
            }),
        )
        .await
        .unwrap();
        let data = resp.0.data.unwrap();
        assert_eq!(data["exists"], true);
        assert_eq!(data["existing_file"]["object_key"], "alice/a.txt");
    }

    #[tokio::test]
    async fn test_list_files_scoped_to_accessible_buckets() {
        let state = test_state();
        grant_access(&state, 1, "cn-hangzhou", "alpha");

        for (bucket, key) in [("alpha", "alice/a.txt"), ("beta", "bob/b.txt")] {
            state
                .file_store
                .save_uploaded_file(crate::db::models::NewFileRecord {
                    config_id: 1,
                    filename: key.to_string(),
                    original_filename: key.rsplit('/').next().unwrap().to_string(),
                    file_size: 4,
                    storage_type: StorageKind::AliyunOss,
                    bucket: bucket.to_string(),
                    object_key: key.to_string(),
                    download_url: None,
                    expires_at: None,
                    uploader_id: 1,
                    upload_ip: "127.0.0.1".to_string(),
                })
                .unwrap();
        }

        let resp = list_files(
            State(state),
            Extension(alice()),
            Query(ListFilesQuery {
                page: 1,
                page_size: 10,
                config_id: None,
            }),
        )
        .await
        .unwrap();
        let data = resp.0.data.unwrap();
        // beta 桶未授权，不可见
        assert_eq!(data["total"], 1);
        assert_eq!(data["items"][0]["bucket"], "alpha");
    }

    #[tokio::test]
    async fn test_download_unknown_file() {
        let state = test_state();
        let err = download_url(
            State(state),
            Extension(alice()),
            Path(999),
            Query(DownloadQuery { expire_hours: Some(1) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, crate::server::error::CODE_FILE_NOT_FOUND);
    }
}
