//! SQLite 数据库模块
//!
//! 提供文件记录、存储配置和访问控制所需的表结构与存储层
//! - oss_files: 文件记录（同一 bucket+object_key 至多一条 ACTIVE）
//! - oss_configs: 存储配置（至多一条 is_default）
//! - region_bucket_mapping / role_region_bucket_access / user_roles: 桶级授权

pub mod file_record;
pub mod models;
pub mod storage_config;

pub use file_record::FileRecordStore;
pub use models::{FileRecord, FileStatus, Md5Status, NewFileRecord, StorageConfig};
pub use storage_config::StorageConfigStore;

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// 数据库句柄
///
/// 内部为单连接 + 互斥锁，事务短小（改写+插入），不会成为瓶颈
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// 打开（或创建）数据库文件
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_tables()?;

        Ok(db)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_tables()?;
        Ok(db)
    }

    /// 获取连接句柄（供各存储层共享）
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 初始化数据库表
    fn init_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // 文件记录表
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS oss_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                md5 TEXT,
                md5_status TEXT NOT NULL DEFAULT 'PENDING',
                storage_type TEXT NOT NULL,
                bucket TEXT NOT NULL,
                object_key TEXT NOT NULL,
                download_url TEXT,
                expires_at INTEGER,
                uploader_id INTEGER NOT NULL,
                upload_ip TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_oss_files_key_status ON oss_files(bucket, object_key, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_oss_files_original_name ON oss_files(original_filename, created_at)",
            [],
        )?;

        // 存储配置表
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS oss_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                storage_type TEXT NOT NULL,
                access_key_id TEXT NOT NULL,
                access_key_secret TEXT NOT NULL,
                endpoint TEXT,
                bucket TEXT NOT NULL,
                region TEXT,
                account_id TEXT,
                upload_dir TEXT NOT NULL DEFAULT '',
                url_expire_secs INTEGER NOT NULL DEFAULT 86400,
                is_default INTEGER NOT NULL DEFAULT 0,
                transfer_accelerate TEXT NOT NULL DEFAULT 'off',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        // 地域-桶映射表
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS region_bucket_mapping (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                region_code TEXT NOT NULL,
                bucket_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(region_code, bucket_name)
            )
            "#,
            [],
        )?;

        // 角色-地域桶授权表（删除映射时级联删除授权）
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS role_region_bucket_access (
                role_id INTEGER NOT NULL,
                region_bucket_id INTEGER NOT NULL
                    REFERENCES region_bucket_mapping(id) ON DELETE CASCADE,
                PRIMARY KEY (role_id, region_bucket_id)
            )
            "#,
            [],
        )?;

        // 用户-角色绑定表
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, role_id)
            )
            "#,
            [],
        )?;

        info!("数据库表初始化完成");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tables() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let conn = conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('oss_files','oss_configs','region_bucket_mapping','role_region_bucket_access','user_roles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }
}
