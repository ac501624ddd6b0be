//! PDF 报告存储

use mediscan_core::{MediscanError, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const URL_PREFIX: &str = "/reports";

/// 已写入磁盘的报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub path: PathBuf,
    pub url: String,
}

/// 报告文件存储，文件名为 `<analysisId>.pdf`
#[derive(Debug, Clone)]
pub struct ReportStore {
    base_dir: PathBuf,
}

impl ReportStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    pub fn url_for(analysis_id: &str) -> String {
        format!("{}/{}.pdf", URL_PREFIX, analysis_id)
    }

    /// 写入报告，同一诊断记录重复生成时覆盖
    pub async fn write(&self, analysis_id: &str, pdf: &[u8]) -> Result<StoredReport> {
        if analysis_id.is_empty()
            || !analysis_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(MediscanError::Storage(format!(
                "Invalid report name '{}'",
                analysis_id
            )));
        }
        self.ensure_dir().await?;

        let path = self.base_dir.join(format!("{}.pdf", analysis_id));
        tokio::fs::write(&path, pdf).await?;
        debug!("Wrote report {:?} ({} bytes)", path, pdf.len());

        Ok(StoredReport {
            path,
            url: Self::url_for(analysis_id),
        })
    }

    /// 删除报告文件，文件不存在时忽略
    pub async fn remove(&self, report: &StoredReport) {
        match tokio::fs::remove_file(&report.path).await {
            Ok(()) => debug!("Removed report {:?}", report.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove report {:?}: {}", report.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_overwrite_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("reports"));

        let first = store.write("ANA-1700000000000-1", b"%PDF-1").await.unwrap();
        assert_eq!(first.url, "/reports/ANA-1700000000000-1.pdf");
        let second = store.write("ANA-1700000000000-1", b"%PDF-2").await.unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(tokio::fs::read(&second.path).await.unwrap(), b"%PDF-2");

        store.remove(&second).await;
        assert!(!second.path.exists());
        store.remove(&second).await;
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.write("../escape", b"x").await.is_err());
        assert!(store.write("", b"x").await.is_err());
    }
}
