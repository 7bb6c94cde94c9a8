//! 对象键推导
//!
//! 自定义路径清洗规则：
//! - 去除首尾斜杠
//! - 拒绝路径穿越（..）与 Windows 保留字符 \ < > : " | ? *

use anyhow::{anyhow, Result};

/// 自定义路径中的非法字符
const ILLEGAL_CHARS: &[char] = &['\\', '<', '>', ':', '"', '|', '?', '*'];

/// 清洗自定义路径
///
/// 返回清洗后的路径（可能为空串，表示上传到根目录）
pub fn sanitize_custom_path(path: &str) -> Result<String> {
    let cleaned = path.trim_matches('/');

    if cleaned.contains("..") {
        return Err(anyhow!("自定义路径包含非法字符"));
    }
    if cleaned.contains(ILLEGAL_CHARS) {
        return Err(anyhow!("自定义路径包含非法字符"));
    }

    Ok(cleaned.to_string())
}

/// 推导对象键
///
/// - 提供自定义路径：`<custom-path>/<原始文件名>`（清洗后为空则直接用文件名）
/// - 未提供：`<用户名>/<原始文件名>`
pub fn derive_object_key(
    custom_path: Option<&str>,
    username: &str,
    original_filename: &str,
) -> Result<String> {
    match custom_path {
        Some(path) => {
            let cleaned = sanitize_custom_path(path)?;
            if cleaned.is_empty() {
                Ok(original_filename.to_string())
            } else {
                Ok(format!("{}/{}", cleaned, original_filename))
            }
        }
        None => Ok(format!("{}/{}", username, original_filename)),
    }
}

/// 生成唯一对象键（分片初始化接口用）
///
/// 形如 `alice/20240601/143045_550e8400-e29b-41d4-a716-446655440000.pdf`
pub fn generate_object_key(username: &str, ext: &str) -> String {
    let now = chrono::Utc::now();
    format!(
        "{}/{}/{}_{}{}",
        username,
        now.format("%Y%m%d"),
        now.format("%H%M%S"),
        uuid::Uuid::new_v4(),
        ext,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_object_key_shape() {
        let key = generate_object_key("alice", ".pdf");
        assert!(key.starts_with("alice/"));
        assert!(key.ends_with(".pdf"));
        assert_eq!(key.split('/').count(), 3);
    }

    #[test]
    fn test_sanitize_trims_slashes() {
        assert_eq!(sanitize_custom_path("/docs/2024/").unwrap(), "docs/2024");
        assert_eq!(sanitize_custom_path("///").unwrap(), "");
    }

    #[test]
    fn test_sanitize_rejects_traversal_and_reserved_chars() {
        assert!(sanitize_custom_path("../etc").is_err());
        assert!(sanitize_custom_path("a/../b").is_err());
        for c in ['\\', '<', '>', ':', '"', '|', '?', '*'] {
            let path = format!("docs{}x", c);
            assert!(sanitize_custom_path(&path).is_err(), "应拒绝字符 {:?}", c);
        }
    }

    #[test]
    fn test_derive_with_custom_path() {
        assert_eq!(
            derive_object_key(Some("docs/2024"), "alice", "report.pdf").unwrap(),
            "docs/2024/report.pdf"
        );
        // 清洗后为空：直接用文件名
        assert_eq!(
            derive_object_key(Some("/"), "alice", "report.pdf").unwrap(),
            "report.pdf"
        );
    }

    #[test]
    fn test_derive_default_is_username_prefixed() {
        assert_eq!(
            derive_object_key(None, "alice", "report.pdf").unwrap(),
            "alice/report.pdf"
        );
    }
}
