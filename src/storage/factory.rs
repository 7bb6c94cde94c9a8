//! 存储服务工厂
//!
//! 按存储类型缓存驱动实例（读写锁 + 双重检查），
//! 默认驱动由 oss_configs.is_default 决定并记忆化；
//! 配置行变更或默认切换时调用 clear_cache 使缓存失效。

use crate::db::models::StorageConfig;
use crate::db::StorageConfigStore;
use crate::storage::{
    AliyunOssStorage, AwsS3Storage, CloudflareR2Storage, ObjectStorage, StorageKind,
};
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 存储服务工厂
pub struct StorageFactory {
    config_store: StorageConfigStore,
    cache: RwLock<HashMap<StorageKind, Arc<dyn ObjectStorage>>>,
    /// 记忆化的默认存储类型
    default_kind: RwLock<Option<StorageKind>>,
}

impl StorageFactory {
    pub fn new(config_store: StorageConfigStore) -> Self {
        Self {
            config_store,
            cache: RwLock::new(HashMap::new()),
            default_kind: RwLock::new(None),
        }
    }

    /// 获取指定类型的存储服务
    pub fn get(&self, kind: StorageKind) -> Result<Arc<dyn ObjectStorage>> {
        // 读锁快路径
        if let Some(service) = self.cache.read().get(&kind) {
            return Ok(Arc::clone(service));
        }

        // 写锁慢路径，二次检查防止重复构建
        let mut cache = self.cache.write();
        if let Some(service) = cache.get(&kind) {
            return Ok(Arc::clone(service));
        }

        let config = self
            .config_store
            .get_by_kind(kind)?
            .ok_or_else(|| anyhow!("存储配置不存在: {}", kind))?;

        let service = Self::build(&config)?;
        cache.insert(kind, Arc::clone(&service));
        info!("存储服务已创建并缓存: {}", kind);
        Ok(service)
    }

    /// 获取默认存储服务
    ///
    /// 无默认配置行时降级为阿里云OSS
    pub fn get_default(&self) -> Result<Arc<dyn ObjectStorage>> {
        if let Some(kind) = *self.default_kind.read() {
            return self.get(kind);
        }

        let kind = match self.config_store.get_default() {
            Ok(Some(config)) => config.storage_type,
            Ok(None) => {
                warn!("未设置默认存储配置，降级为阿里云OSS");
                StorageKind::AliyunOss
            }
            Err(e) => {
                warn!("查询默认存储配置失败，降级为阿里云OSS: {}", e);
                StorageKind::AliyunOss
            }
        };

        *self.default_kind.write() = Some(kind);
        self.get(kind)
    }

    /// 清空驱动缓存与默认记忆
    ///
    /// 配置行被修改或默认标志被重新指派时必须调用
    pub fn clear_cache(&self) {
        self.cache.write().clear();
        *self.default_kind.write() = None;
        info!("存储服务缓存已清空");
    }

    fn build(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
        let service: Arc<dyn ObjectStorage> = match config.storage_type {
            StorageKind::AliyunOss => Arc::new(AliyunOssStorage::new(config)?),
            StorageKind::AwsS3 => Arc::new(AwsS3Storage::new(config)?),
            StorageKind::CloudflareR2 => Arc::new(CloudflareR2Storage::new(config)?),
        };
        Ok(service)
    }

    /// 当前缓存的驱动数（监控用）
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TransferAccelerate;
    use crate::db::Database;

    fn seed_config(store: &StorageConfigStore, kind: StorageKind, is_default: bool) -> i64 {
        store
            .create(&StorageConfig {
                id: 0,
                name: format!("{}-cfg", kind),
                storage_type: kind,
                access_key_id: "ak".to_string(),
                access_key_secret: "sk".to_string(),
                endpoint: Some("oss-cn-hangzhou.aliyuncs.com".to_string()),
                bucket: "alpha".to_string(),
                region: Some("cn-hangzhou".to_string()),
                account_id: Some("acct".to_string()),
                upload_dir: "uploads".to_string(),
                url_expire_secs: 86400,
                is_default,
                transfer_accelerate: TransferAccelerate::Off,
                created_at: 0,
                updated_at: 0,
            })
            .unwrap()
    }

    #[test]
    fn test_get_caches_instance() {
        let db = Database::open_in_memory().unwrap();
        let store = StorageConfigStore::new(db.conn());
        seed_config(&store, StorageKind::AliyunOss, true);

        let factory = StorageFactory::new(store);
        assert_eq!(factory.cached_count(), 0);

        let a = factory.get(StorageKind::AliyunOss).unwrap();
        let b = factory.get(StorageKind::AliyunOss).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached_count(), 1);
    }

    #[test]
    fn test_get_missing_config_fails() {
        let db = Database::open_in_memory().unwrap();
        let factory = StorageFactory::new(StorageConfigStore::new(db.conn()));
        assert!(factory.get(StorageKind::AwsS3).is_err());
    }

    #[test]
    fn test_get_default_follows_flag() {
        let db = Database::open_in_memory().unwrap();
        let store = StorageConfigStore::new(db.conn());
        seed_config(&store, StorageKind::AliyunOss, false);
        let s3_id = seed_config(&store, StorageKind::AwsS3, true);

        let factory = StorageFactory::new(store.clone());
        let service = factory.get_default().unwrap();
        assert_eq!(service.kind(), StorageKind::AwsS3);

        // 切换默认后必须清缓存才会生效
        let aliyun_id = store.list().unwrap()[0].id;
        assert_ne!(aliyun_id, s3_id);
        store.set_default(aliyun_id).unwrap();
        assert_eq!(factory.get_default().unwrap().kind(), StorageKind::AwsS3);

        factory.clear_cache();
        assert_eq!(factory.get_default().unwrap().kind(), StorageKind::AliyunOss);
    }

    #[test]
    fn test_default_fallback_to_aliyun() {
        let db = Database::open_in_memory().unwrap();
        let store = StorageConfigStore::new(db.conn());
        // 有阿里云配置但没有默认标志
        seed_config(&store, StorageKind::AliyunOss, false);

        let factory = StorageFactory::new(store);
        assert_eq!(factory.get_default().unwrap().kind(), StorageKind::AliyunOss);
    }
}
