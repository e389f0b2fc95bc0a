use crate::core::Storage;
use crate::utils::error::{EtlError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filesystem storage rooted at `base_path`.
///
/// Writes go to a uniquely named sibling temp file which is synced and then
/// renamed over the target, so readers never observe a half-written file
/// and concurrent writers never share a temp file.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 寫入同目錄下唯一的暫存檔並 fsync，再以 rename 取代目標
    fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = target
            .file_name()
            .map(|n| format!("{}.", n.to_string_lossy()))
            .unwrap_or_default();

        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(parent)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // 暫存檔在失敗時會隨 NamedTempFile 一併刪除
        let target = full_path.clone();
        let len = data.len();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || Self::write_atomic(&target, &data))
            .await
            .map_err(|e| EtlError::ProcessingError {
                message: format!("storage write task failed: {}", e),
            })??;

        tracing::debug!("Wrote {} bytes to {}", len, full_path.display());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.base_path.join(path))
            .await
            .unwrap_or(false)
    }
}
