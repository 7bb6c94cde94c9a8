// 应用状态

use crate::access::AccessResolver;
use crate::config::AppConfig;
use crate::db::{Database, FileRecordStore, StorageConfigStore};
use crate::progress::ProgressBroker;
use crate::storage::StorageFactory;
use std::sync::Arc;

/// 连接对端地址（由 main 的 HTTP/1.1 accept 循环注入请求扩展）
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub std::net::SocketAddr);

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 数据库句柄
    pub db: Database,
    /// 文件记录存储
    pub file_store: FileRecordStore,
    /// 存储配置存储
    pub config_store: StorageConfigStore,
    /// 桶级访问控制
    pub access: AccessResolver,
    /// 存储服务工厂
    pub factory: Arc<StorageFactory>,
    /// 进度管理器（进程级单例）
    pub broker: ProgressBroker,
}

impl AppState {
    /// 创建应用状态
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = Database::new(&config.database.path)?;
        Self::with_database(config, db)
    }

    /// 基于既有数据库创建（测试注入内存库）
    pub fn with_database(config: AppConfig, db: Database) -> anyhow::Result<Self> {
        let conn = db.conn();
        let config_store = StorageConfigStore::new(conn.clone());
        let factory = Arc::new(StorageFactory::new(config_store.clone()));

        Ok(Self {
            config: Arc::new(config),
            file_store: FileRecordStore::new(conn.clone()),
            config_store,
            access: AccessResolver::new(conn),
            factory,
            broker: ProgressBroker::new(),
            db,
        })
    }
}
