//! 文件记录存储层
//!
//! 核心不变式：同一 (bucket, object_key) 至多一条 ACTIVE 记录。
//! 写入协议（单事务）：
//! 1. 旧 ACTIVE 记录改写为 REPLACED
//! 2. 插入新 ACTIVE 记录
//! 3. 提交；任何一步失败则回滚

use crate::db::models::{FileRecord, FileStatus, Md5Status, NewFileRecord};
use crate::storage::StorageKind;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 文件记录存储
#[derive(Clone)]
pub struct FileRecordStore {
    conn: Arc<Mutex<Connection>>,
}

/// 行到结构体的映射（列顺序与 SELECT_COLUMNS 一致）
const SELECT_COLUMNS: &str = "id, config_id, filename, original_filename, file_size, md5, \
     md5_status, storage_type, bucket, object_key, download_url, expires_at, \
     uploader_id, upload_ip, status, created_at, updated_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let md5_status: String = row.get(6)?;
    let storage_type: String = row.get(7)?;
    let status: String = row.get(14)?;
    Ok(FileRecord {
        id: row.get(0)?,
        config_id: row.get(1)?,
        filename: row.get(2)?,
        original_filename: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        md5: row.get(5)?,
        md5_status: Md5Status::parse(&md5_status).unwrap_or(Md5Status::Pending),
        storage_type: StorageKind::parse(&storage_type).unwrap_or(StorageKind::AliyunOss),
        bucket: row.get(8)?,
        object_key: row.get(9)?,
        download_url: row.get(10)?,
        expires_at: row.get(11)?,
        uploader_id: row.get(12)?,
        upload_ip: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        status: FileStatus::parse(&status).unwrap_or(FileStatus::Active),
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl FileRecordStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 保存上传完成的文件记录
    ///
    /// 在同一事务内将同键旧 ACTIVE 记录改写为 REPLACED 并插入新记录，
    /// 并发读取方不会观察到同键两条 ACTIVE
    pub fn save_uploaded_file(&self, record: NewFileRecord) -> Result<FileRecord> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction().context("开启事务失败")?;

        // 1. 旧记录标记为 REPLACED
        let replaced = tx.execute(
            "UPDATE oss_files SET status = 'REPLACED', updated_at = ?1 \
             WHERE bucket = ?2 AND object_key = ?3 AND status = 'ACTIVE'",
            params![now, record.bucket, record.object_key],
        )?;

        // 2. 插入新的 ACTIVE 记录
        tx.execute(
            r#"
            INSERT INTO oss_files (
                config_id, filename, original_filename, file_size,
                md5_status, storage_type, bucket, object_key,
                download_url, expires_at, uploader_id, upload_ip,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'ACTIVE', ?12, ?12)
            "#,
            params![
                record.config_id,
                record.filename,
                record.original_filename,
                record.file_size as i64,
                record.storage_type.as_str(),
                record.bucket,
                record.object_key,
                record.download_url,
                record.expires_at,
                record.uploader_id,
                record.upload_ip,
                now,
            ],
        )?;

        let id = tx.last_insert_rowid();
        tx.commit().context("提交事务失败")?;

        if replaced > 0 {
            info!(
                "同键旧记录已替换: bucket={}, object_key={}, replaced={}",
                record.bucket, record.object_key, replaced
            );
        }

        let stored = FileRecord {
            id,
            config_id: record.config_id,
            filename: record.filename,
            original_filename: record.original_filename,
            file_size: record.file_size,
            md5: None,
            md5_status: Md5Status::Pending,
            storage_type: record.storage_type,
            bucket: record.bucket,
            object_key: record.object_key,
            download_url: record.download_url,
            expires_at: record.expires_at,
            uploader_id: record.uploader_id,
            upload_ip: record.upload_ip,
            status: FileStatus::Active,
            created_at: now,
            updated_at: now,
        };

        debug!("文件记录保存成功: id={}, object_key={}", stored.id, stored.object_key);
        Ok(stored)
    }

    /// 检查同键是否已有 ACTIVE 记录（上传冲突预检）
    pub fn exists_active(&self, bucket: &str, object_key: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM oss_files WHERE bucket = ?1 AND object_key = ?2 AND status = 'ACTIVE'",
            params![bucket, object_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 查询同键的 ACTIVE 记录
    pub fn find_active(&self, bucket: &str, object_key: &str) -> Result<Option<FileRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!(
            "SELECT {} FROM oss_files WHERE bucket = ?1 AND object_key = ?2 AND status = 'ACTIVE'",
            SELECT_COLUMNS
        );
        let record = conn
            .query_row(&sql, params![bucket, object_key], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// 按ID查询
    pub fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let sql = format!("SELECT {} FROM oss_files WHERE id = ?1", SELECT_COLUMNS);
        let record = conn.query_row(&sql, params![id], row_to_record).optional()?;
        Ok(record)
    }

    /// 软删除
    pub fn mark_deleted(&self, id: i64) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        let affected = conn.execute(
            "UPDATE oss_files SET status = 'DELETED', updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if affected == 0 {
            return Err(anyhow!("文件记录不存在: id={}", id));
        }
        Ok(())
    }

    /// 更新 MD5 计算结果
    pub fn update_md5(&self, id: i64, md5: Option<&str>, status: Md5Status) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE oss_files SET md5 = ?1, md5_status = ?2, updated_at = ?3 WHERE id = ?4",
            params![md5, status.as_str(), now, id],
        )?;
        Ok(())
    }

    /// 文件列表：同名文件只取最新一条
    ///
    /// # 参数
    /// * `buckets` - 用户可访问的桶列表（空列表直接返回空结果）
    /// * `config_id` - 可选的配置过滤
    /// * `page` / `page_size` - 分页（页码从 1 开始）
    ///
    /// # 返回
    /// (去重后的文件名总数, 当前页记录)
    pub fn list(
        &self,
        buckets: &[String],
        config_id: Option<i64>,
        page: usize,
        page_size: usize,
    ) -> Result<(u64, Vec<FileRecord>)> {
        if buckets.is_empty() {
            return Ok((0, Vec::new()));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("获取数据库锁失败: {}", e))?;

        let placeholders = buckets
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");

        let mut filter = format!("bucket IN ({})", placeholders);
        if config_id.is_some() {
            filter.push_str(" AND config_id = ?");
        }

        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = buckets
            .iter()
            .map(|b| Box::new(b.clone()) as Box<dyn rusqlite::ToSql>)
            .collect();
        if let Some(cid) = config_id {
            bind.push(Box::new(cid));
        }
        let bind_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();

        // 去重后的文件名总数
        let total_sql = format!(
            "SELECT COUNT(DISTINCT original_filename) FROM oss_files WHERE {}",
            filter
        );
        let total: i64 = conn.query_row(&total_sql, bind_refs.as_slice(), |row| row.get(0))?;

        // 每个文件名取最新一条（created_at 相同的并发插入以 id 大者为新）
        let page = page.max(1);
        let list_sql = format!(
            "SELECT {cols} FROM oss_files f \
             WHERE f.id IN ( \
                 SELECT MAX(id) FROM oss_files WHERE {filter} \
                 GROUP BY original_filename \
             ) \
             ORDER BY f.created_at DESC, f.id DESC LIMIT ? OFFSET ?",
            cols = SELECT_COLUMNS,
            filter = filter
        );

        let mut bind2: Vec<Box<dyn rusqlite::ToSql>> = buckets
            .iter()
            .map(|b| Box::new(b.clone()) as Box<dyn rusqlite::ToSql>)
            .collect();
        if let Some(cid) = config_id {
            bind2.push(Box::new(cid));
        }
        bind2.push(Box::new(page_size as i64));
        bind2.push(Box::new(((page - 1) * page_size) as i64));
        let bind2_refs: Vec<&dyn rusqlite::ToSql> = bind2.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(&list_sql)?;
        let rows = stmt.query_map(bind2_refs.as_slice(), row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok((total as u64, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn new_record(bucket: &str, key: &str, name: &str) -> NewFileRecord {
        NewFileRecord {
            config_id: 1,
            filename: key.to_string(),
            original_filename: name.to_string(),
            file_size: 1024,
            storage_type: StorageKind::AliyunOss,
            bucket: bucket.to_string(),
            object_key: key.to_string(),
            download_url: Some("https://example.com/x".to_string()),
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
            uploader_id: 1,
            upload_ip: "127.0.0.1".to_string(),
        }
    }

    fn store() -> FileRecordStore {
        let db = Database::open_in_memory().unwrap();
        FileRecordStore::new(db.conn())
    }

    #[test]
    fn test_save_and_find_active() {
        let store = store();
        let stored = store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        assert_eq!(stored.status, FileStatus::Active);
        assert_eq!(stored.md5_status, Md5Status::Pending);

        assert!(store.exists_active("alpha", "alice/a.txt").unwrap());
        assert!(!store.exists_active("alpha", "alice/b.txt").unwrap());

        let found = store.find_active("alpha", "alice/a.txt").unwrap().unwrap();
        assert_eq!(found.id, stored.id);
    }

    #[test]
    fn test_supersede_keeps_single_active() {
        let store = store();
        let first = store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        let second = store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        assert_ne!(first.id, second.id);

        // 同键只剩一条 ACTIVE，旧记录变为 REPLACED
        let active = store.find_active("alpha", "alice/a.txt").unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let old = store.get(first.id).unwrap().unwrap();
        assert_eq!(old.status, FileStatus::Replaced);
    }

    #[test]
    fn test_mark_deleted() {
        let store = store();
        let stored = store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        store.mark_deleted(stored.id).unwrap();

        let record = store.get(stored.id).unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Deleted);
        assert!(!store.exists_active("alpha", "alice/a.txt").unwrap());

        // 不存在的ID报错
        assert!(store.mark_deleted(9999).is_err());
    }

    #[test]
    fn test_update_md5() {
        let store = store();
        let stored = store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();

        store
            .update_md5(stored.id, None, Md5Status::Calculating)
            .unwrap();
        let record = store.get(stored.id).unwrap().unwrap();
        assert_eq!(record.md5_status, Md5Status::Calculating);

        store
            .update_md5(stored.id, Some("d41d8cd98f00b204e9800998ecf8427e"), Md5Status::Completed)
            .unwrap();
        let record = store.get(stored.id).unwrap().unwrap();
        assert_eq!(record.md5_status, Md5Status::Completed);
        assert_eq!(record.md5.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn test_list_dedup_by_original_filename() {
        let store = store();
        store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        // 同名文件再次上传（不同键）
        let latest = store
            .save_uploaded_file(new_record("alpha", "bob/a.txt", "a.txt"))
            .unwrap();
        store
            .save_uploaded_file(new_record("alpha", "alice/b.txt", "b.txt"))
            .unwrap();

        let buckets = vec!["alpha".to_string()];
        let (total, records) = store.list(&buckets, None, 1, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(records.len(), 2);

        // a.txt 只保留最新一条
        let a = records
            .iter()
            .find(|r| r.original_filename == "a.txt")
            .unwrap();
        assert_eq!(a.id, latest.id);
    }

    #[test]
    fn test_list_empty_buckets() {
        let store = store();
        store
            .save_uploaded_file(new_record("alpha", "alice/a.txt", "a.txt"))
            .unwrap();
        let (total, records) = store.list(&[], None, 1, 10).unwrap();
        assert_eq!(total, 0);
        assert!(records.is_empty());
    }
}
