//! 存储配置API处理器
//!
//! 配置增删改由运营后台负责，这里只暴露网关关心的两个动作：
//! 列表（凭证字段不出网）与默认切换。
//! 默认切换后必须清空驱动缓存，否则工厂继续命中旧默认。

use crate::auth::CurrentUser;
use crate::db::models::StorageConfig;
use crate::server::error::{ok, ApiError, ApiResult};
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use tracing::info;

/// 列出存储配置
///
/// GET /api/v1/oss/configs
pub async fn list_configs(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
) -> ApiResult<Vec<StorageConfig>> {
    let configs = state
        .config_store
        .list()
        .map_err(|_| ApiError::server_error("获取存储配置失败"))?;
    ok(configs)
}

/// 设置默认存储配置
///
/// PUT /api/v1/oss/configs/:id/default
pub async fn set_default_config(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.config_store.set_default(id).map_err(|e| {
        if e.to_string().contains("不存在") {
            ApiError::config_not_found("存储配置不存在")
        } else {
            ApiError::server_error("设置默认存储配置失败")
        }
    })?;

    // 默认切换会改变工厂的路由结果，缓存必须失效
    state.factory.clear_cache();

    info!("默认存储配置已切换: config_id={}, 操作者={}", id, user.username);
    Ok(Json(crate::server::error::ApiResponse::<()>::success_empty()))
}
