//! 桶级访问控制
//!
//! 授权链路：user_roles -> role_region_bucket_access -> region_bucket_mapping。
//! 匹配只看 (user_id, bucket_name)；region 参数仅用于日志与端点选择，
//! 不参与授权判断（桶名全局唯一）。
//!
//! 失败语义：任何数据库错误一律拒绝（fail-closed）。

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 访问控制解析器
#[derive(Clone)]
pub struct AccessResolver {
    conn: Arc<Mutex<Connection>>,
}

impl AccessResolver {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 检查用户是否可访问指定桶
    ///
    /// region 仅做日志记录，授权取决于 (user_id, bucket)
    pub fn check_bucket_access(&self, user_id: i64, region: &str, bucket: &str) -> bool {
        match self.query_access(user_id, bucket) {
            Ok(allowed) => {
                if !allowed {
                    warn!(
                        "桶访问被拒绝: user_id={}, region={}, bucket={}",
                        user_id, region, bucket
                    );
                }
                allowed
            }
            Err(e) => {
                // fail-closed：查询失败按无权限处理
                warn!(
                    "桶访问检查失败，按拒绝处理: user_id={}, bucket={}, 错误: {}",
                    user_id, bucket, e
                );
                false
            }
        }
    }

    fn query_access(&self, user_id: i64, bucket: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM user_roles ur
            JOIN role_region_bucket_access rrba ON ur.role_id = rrba.role_id
            JOIN region_bucket_mapping rbm ON rrba.region_bucket_id = rbm.id
            WHERE ur.user_id = ?1 AND rbm.bucket_name = ?2
            "#,
            params![user_id, bucket],
            |row| row.get(0),
        )?;

        debug!(
            "桶访问检查: user_id={}, bucket={}, 命中授权={}",
            user_id, bucket, count
        );
        Ok(count > 0)
    }

    /// 获取用户可访问的桶列表（去重，可按地域过滤）
    ///
    /// 查询失败返回空列表（fail-closed）
    pub fn accessible_buckets(&self, user_id: i64, region_filter: Option<&str>) -> Vec<String> {
        match self.query_buckets(user_id, region_filter) {
            Ok(buckets) => buckets,
            Err(e) => {
                warn!(
                    "查询用户可访问桶失败，返回空列表: user_id={}, 错误: {}",
                    user_id, e
                );
                Vec::new()
            }
        }
    }

    /// 通过桶名反查地域（用于删除/下载等只有桶名的场景）
    pub fn region_for_bucket(&self, bucket: &str) -> Option<String> {
        let conn = self.conn.lock().ok()?;
        conn.query_row(
            "SELECT region_code FROM region_bucket_mapping WHERE bucket_name = ?1 LIMIT 1",
            params![bucket],
            |row| row.get::<_, String>(0),
        )
        .ok()
    }

    fn query_buckets(&self, user_id: i64, region_filter: Option<&str>) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let base = r#"
            SELECT DISTINCT rbm.bucket_name FROM user_roles ur
            JOIN role_region_bucket_access rrba ON ur.role_id = rrba.role_id
            JOIN region_bucket_mapping rbm ON rrba.region_bucket_id = rbm.id
            WHERE ur.user_id = ?1
        "#;

        let mut buckets = Vec::new();
        if let Some(region) = region_filter {
            let sql = format!("{} AND rbm.region_code = ?2 ORDER BY rbm.bucket_name", base);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id, region], |row| row.get::<_, String>(0))?;
            for row in rows {
                buckets.push(row?);
            }
        } else {
            let sql = format!("{} ORDER BY rbm.bucket_name", base);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                buckets.push(row?);
            }
        }
        Ok(buckets)
    }
}
