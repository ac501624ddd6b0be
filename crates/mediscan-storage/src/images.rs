//! 胸片上传存储

use chrono::Utc;
use mediscan_core::{MediscanError, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 允许的扩展名
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];
/// 允许的 MIME 类型
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

const URL_PREFIX: &str = "/uploads";

/// 已写入磁盘的上传文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
    pub file_name: String,
    pub size: u64,
}

/// 上传文件存储
#[derive(Debug, Clone)]
pub struct ImageStore {
    base_dir: PathBuf,
    max_bytes: u64,
}

impl ImageStore {
    pub fn new(base_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_bytes,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    /// 校验扩展名、MIME 类型和大小，全部通过后才写盘
    pub fn validate(&self, original_name: &str, content_type: Option<&str>, size: u64) -> Result<()> {
        let extension_ok = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let mime_ok = content_type
            .map(|m| ALLOWED_MIME_TYPES.contains(&m.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !extension_ok || !mime_ok {
            return Err(MediscanError::validation(
                "Only .png, .jpg and .jpeg format allowed!",
            ));
        }
        if size == 0 {
            return Err(MediscanError::validation("Uploaded image is empty"));
        }
        if size > self.max_bytes {
            return Err(MediscanError::validation(format!(
                "Image exceeds the {} MB upload limit",
                self.max_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// 保存上传文件，文件名为 `<毫秒时间戳>-<原文件名>`
    pub async fn save(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<StoredImage> {
        self.validate(original_name, content_type, data.len() as u64)?;
        self.ensure_dir().await?;

        let stem = sanitize_file_name(original_name);
        let millis = Utc::now().timestamp_millis();

        // 同一毫秒内同名上传时追加序号
        for attempt in 0u32..16 {
            let file_name = if attempt == 0 {
                format!("{}-{}", millis, stem)
            } else {
                format!("{}-{}-{}", millis, attempt, stem)
            };
            let path = self.base_dir.join(&file_name);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = write_all(&mut file, data).await {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial upload {:?}: {}", path, cleanup);
                }
                return Err(e);
            }

            debug!("Stored upload {:?} ({} bytes)", path, data.len());
            return Ok(StoredImage {
                url: format!("{}/{}", URL_PREFIX, file_name),
                path,
                file_name,
                size: data.len() as u64,
            });
        }

        Err(MediscanError::Storage(format!(
            "Could not allocate a unique file name for '{}'",
            original_name
        )))
    }
}

async fn write_all(file: &mut tokio::fs::File, data: &[u8]) -> Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// 只保留文件名部分，非常规字符替换为下划线
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// 上传文件清理守卫
///
/// 请求失败时在析构中删除已写入的文件；调用 `keep` 后保留。
#[derive(Debug)]
pub struct UploadGuard {
    path: Option<PathBuf>,
}

impl UploadGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed orphaned upload {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove orphaned upload {:?}: {}", path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_validate_requires_extension_and_mime() {
        let store = ImageStore::new("/tmp/unused", 10 * MB);
        assert!(store.validate("scan.png", Some("image/png"), 10).is_ok());
        assert!(store.validate("scan.JPG", Some("image/jpeg"), 10).is_ok());
        assert!(store.validate("scan.gif", Some("image/gif"), 10).is_err());
        assert!(store.validate("scan.png", Some("application/pdf"), 10).is_err());
        assert!(store.validate("scan.pdf", Some("image/png"), 10).is_err());
        assert!(store.validate("scan.png", None, 10).is_err());
    }

    #[test]
    fn test_validate_size_limit() {
        let store = ImageStore::new("/tmp/unused", 10 * MB);
        assert!(store.validate("a.png", Some("image/png"), 10 * MB).is_ok());
        let err = store.validate("a.png", Some("image/png"), 10 * MB + 1).unwrap_err();
        assert!(matches!(err, MediscanError::Validation(_)));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\chest x-ray.png"), "chest_x-ray.png");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[tokio::test]
    async fn test_save_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), MB);
        let stored = store.save("chest.png", Some("image/png"), b"fake-png").await.unwrap();

        assert!(stored.file_name.ends_with("-chest.png"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.file_name));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"fake-png");

        let again = store.save("chest.png", Some("image/png"), b"other").await.unwrap();
        assert_ne!(again.path, stored.path);
    }

    #[tokio::test]
    async fn test_rejected_upload_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), MB);
        assert!(store.save("notes.txt", Some("text/plain"), b"hello").await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_guard_removes_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), MB);

        let dropped = store.save("a.png", Some("image/png"), b"1").await.unwrap();
        drop(UploadGuard::new(&dropped.path));
        assert!(!dropped.path.exists());

        let kept = store.save("b.png", Some("image/png"), b"2").await.unwrap();
        let guard = UploadGuard::new(&kept.path);
        assert_eq!(guard.keep(), kept.path);
        assert!(kept.path.exists());
    }
}
