//! 存储配置存储层
//!
//! is_default 不变式：全表至多一条默认配置，由 set_default 事务保证
//! （先清零所有 is_default，再置位目标行）

use crate::db::models::{StorageConfig, TransferAccelerate};
use crate::storage::StorageKind;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub struct StorageConfigStore {
    conn: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = "id, name, storage_type, access_key_id, access_key_secret, endpoint, \
     bucket, region, account_id, upload_dir, url_expire_secs, is_default, \
     transfer_accelerate, created_at, updated_at";

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<StorageConfig> {
    let storage_type: String = row.get(2)?;
    let accelerate: String = row.get(12)?;
    Ok(StorageConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        storage_type: StorageKind::parse(&storage_type).unwrap_or(StorageKind::AliyunOss),
        access_key_id: row.get(3)?,
        access_key_secret: row.get(4)?,
        endpoint: row.get(5)?,
        bucket: row.get(6)?,
        region: row.get(7)?,
        account_id: row.get(8)?,
        upload_dir: row.get(9)?,
        url_expire_secs: row.get::<_, i64>(10)? as u64,
        is_default: row.get::<_, i64>(11)? != 0,
        transfer_accelerate: TransferAccelerate::parse(&accelerate),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl StorageConfigStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 新建存储配置
    pub fn create(&self, config: &StorageConfig) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            r#"
            INSERT INTO oss_configs (
                name, storage_type, access_key_id, access_key_secret, endpoint,
                bucket, region, account_id, upload_dir, url_expire_secs,
                is_default, transfer_accelerate, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                config.name,
                config.storage_type.as_str(),
                config.access_key_id,
                config.access_key_secret,
                config.endpoint,
                config.bucket,
                config.region,
                config.account_id,
                config.upload_dir,
                config.url_expire_secs as i64,
                config.is_default as i64,
                config.transfer_accelerate.as_str(),
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按ID查询
    pub fn get(&self, id: i64) -> Result<Option<StorageConfig>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!("SELECT {} FROM oss_configs WHERE id = ?1", SELECT_COLUMNS);
        let config = conn.query_row(&sql, params![id], row_to_config).optional()?;
        Ok(config)
    }

    /// 按存储类型查询（同类型多条时取默认行优先、其次最新）
    pub fn get_by_kind(&self, kind: StorageKind) -> Result<Option<StorageConfig>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!(
            "SELECT {} FROM oss_configs WHERE storage_type = ?1 \
             ORDER BY is_default DESC, updated_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let config = conn
            .query_row(&sql, params![kind.as_str()], row_to_config)
            .optional()?;
        Ok(config)
    }

    /// 查询默认配置
    pub fn get_default(&self) -> Result<Option<StorageConfig>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!(
            "SELECT {} FROM oss_configs WHERE is_default = 1 LIMIT 1",
            SELECT_COLUMNS
        );
        let config = conn.query_row(&sql, [], row_to_config).optional()?;
        Ok(config)
    }

    /// 列出全部配置
    pub fn list(&self) -> Result<Vec<StorageConfig>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!("SELECT {} FROM oss_configs ORDER BY id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_config)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?);
        }
        Ok(configs)
    }

    /// 设置默认配置
    ///
    /// 单事务：先清零全表 is_default，再置位目标行，保证至多一条默认
    pub fn set_default(&self, id: i64) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction().context("开启事务失败")?;

        tx.execute("UPDATE oss_configs SET is_default = 0 WHERE is_default = 1", [])?;
        let affected = tx.execute(
            "UPDATE oss_configs SET is_default = 1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;

        if affected == 0 {
            // 目标配置不存在，整体回滚
            return Err(anyhow!("存储配置不存在: id={}", id));
        }

        tx.commit().context("提交事务失败")?;
        info!("默认存储配置已切换: id={}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn sample(name: &str, kind: StorageKind, is_default: bool) -> StorageConfig {
        StorageConfig {
            id: 0,
            name: name.to_string(),
            storage_type: kind,
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            endpoint: Some("oss-cn-hangzhou.aliyuncs.com".to_string()),
            bucket: "alpha".to_string(),
            region: Some("cn-hangzhou".to_string()),
            account_id: None,
            upload_dir: "uploads".to_string(),
            url_expire_secs: 86400,
            is_default,
            transfer_accelerate: TransferAccelerate::Off,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn store() -> StorageConfigStore {
        let db = Database::open_in_memory().unwrap();
        StorageConfigStore::new(db.conn())
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let id = store
            .create(&sample("aliyun-main", StorageKind::AliyunOss, true))
            .unwrap();

        let config = store.get(id).unwrap().unwrap();
        assert_eq!(config.name, "aliyun-main");
        assert_eq!(config.storage_type, StorageKind::AliyunOss);
        assert!(config.is_default);

        assert!(store.get(9999).unwrap().is_none());
    }

    #[test]
    fn test_set_default_single_flag() {
        let store = store();
        let a = store
            .create(&sample("aliyun", StorageKind::AliyunOss, true))
            .unwrap();
        let b = store.create(&sample("s3", StorageKind::AwsS3, false)).unwrap();

        store.set_default(b).unwrap();

        let configs = store.list().unwrap();
        let defaults: Vec<_> = configs.iter().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, b);

        let old = store.get(a).unwrap().unwrap();
        assert!(!old.is_default);
    }

    #[test]
    fn test_set_default_missing_rolls_back() {
        let store = store();
        let a = store
            .create(&sample("aliyun", StorageKind::AliyunOss, true))
            .unwrap();

        assert!(store.set_default(9999).is_err());

        // 回滚后原默认仍在
        let config = store.get(a).unwrap().unwrap();
        assert!(config.is_default);
        assert!(store.get_default().unwrap().is_some());
    }

    #[test]
    fn test_get_by_kind_prefers_default() {
        let store = store();
        store
            .create(&sample("aliyun-a", StorageKind::AliyunOss, false))
            .unwrap();
        let b = store
            .create(&sample("aliyun-b", StorageKind::AliyunOss, true))
            .unwrap();

        let picked = store.get_by_kind(StorageKind::AliyunOss).unwrap().unwrap();
        assert_eq!(picked.id, b);
    }
}
