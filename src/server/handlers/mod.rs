// API处理器模块

pub mod oss_config;
pub mod oss_file;
pub mod progress;

pub use oss_config::*;
pub use oss_file::*;
pub use progress::*;
