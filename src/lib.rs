// OSS Gateway Rust Library
// 多云对象存储网关核心库

// 认证模块
pub mod auth;

// 桶级访问控制模块
pub mod access;

// 配置管理模块
pub mod config;

// 数据库模块
pub mod db;

// 上传进度模块
pub mod progress;

// 存储驱动模块
pub mod storage;

// 上传引擎模块
pub mod uploader;

// MD5 后台计算模块
pub mod checksum;

// Web服务器模块
pub mod server;

// 日志模块
pub mod logging;

// 导出常用类型
pub use access::AccessResolver;
pub use config::AppConfig;
pub use db::{Database, FileRecord, FileRecordStore, FileStatus, StorageConfigStore};
pub use progress::{ProgressBroker, UploadProgress, UploadProgressStatus};
pub use server::AppState;
pub use storage::{ObjectStorage, Part, StorageFactory, StorageKind};
pub use uploader::UploadEngine;
