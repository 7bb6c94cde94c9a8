// 上传引擎模块
//
// 按负载大小自适应选择上传路径：
// - 小于等于阈值：单次 PUT，SDK 进度回调直通进度管理器
// - 超过阈值：分片上传，串行读取 + 有界并发分片 PUT，支持断点续传

pub mod chunk;
pub mod engine;
pub mod object_key;

pub use chunk::{
    current_chunk_size, read_chunk_with_retry, total_chunks, DEFAULT_CHUNK_READ_TIMEOUT,
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_THRESHOLD,
};
pub use engine::{UploadEngine, UploadParams};
pub use object_key::{derive_object_key, generate_object_key, sanitize_custom_path};
