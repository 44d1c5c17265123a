use crate::error::{AppError, AppResult};
use crate::utils::hash::calculate_file_hash;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Upload,
    Snapshot,
    Diff,
}

impl BlobKind {
    fn dir_name(&self) -> &'static str {
        match self {
            Self::Upload => "uploads",
            Self::Snapshot => "snapshots",
            Self::Diff => "diffs",
        }
    }
}

/// Content-addressed store for uploaded source files, published snapshots,
/// and historical diffs. Every blob is written to a temp file and renamed
/// into place so a reader never observes a partially written file.
#[derive(Clone)]
pub struct BlobStore {
    base_dir: PathBuf,
}

impl BlobStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn kind_dir(&self, kind: BlobKind) -> PathBuf {
        self.base_dir.join(kind.dir_name())
    }

    fn blob_path(&self, kind: BlobKind, hash: &str) -> PathBuf {
        self.kind_dir(kind).join(hash)
    }

    pub async fn put(&self, kind: BlobKind, bytes: &[u8]) -> AppResult<String> {
        let dir = self.kind_dir(kind);
        tokio::fs::create_dir_all(&dir).await?;

        let tmp_path = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
        }

        let hash = calculate_file_hash(&tmp_path).await?;
        let final_path = self.blob_path(kind, &hash);

        if final_path.exists() {
            tokio::fs::remove_file(&tmp_path).await?;
        } else {
            tokio::fs::rename(&tmp_path, &final_path).await?;
        }

        Ok(hash)
    }

    pub async fn open(&self, kind: BlobKind, hash: &str) -> AppResult<Vec<u8>> {
        let path = self.blob_path(kind, hash);
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::NotFound(format!("blob {} not found: {}", hash, e)))
    }

    pub fn path(&self, kind: BlobKind, hash: &str) -> PathBuf {
        self.blob_path(kind, hash)
    }

    pub async fn delete(&self, kind: BlobKind, hash: &str) -> AppResult<()> {
        let path = self.blob_path(kind, hash);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    pub async fn stat(&self, kind: BlobKind, hash: &str) -> AppResult<u64> {
        let path = self.blob_path(kind, hash);
        let meta = tokio::fs::metadata(&path).await?;
        Ok(meta.len())
    }
}

pub fn ensure_extension_supported(filename: &str) -> AppResult<()> {
    let lower = filename.to_lowercase();
    let supported = crate::constants::SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext));

    if supported {
        Ok(())
    } else {
        Err(AppError::UnsupportedFormat(format!(
            "unsupported file extension for {}",
            filename
        )))
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_then_open_roundtrip() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf());

        let hash = store.put(BlobKind::Upload, b"hello world").await.unwrap();
        let bytes = store.open(BlobKind::Upload, &hash).await.unwrap();

        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_put_is_content_addressed() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf());

        let hash1 = store.put(BlobKind::Upload, b"same bytes").await.unwrap();
        let hash2 = store.put(BlobKind::Upload, b"same bytes").await.unwrap();

        assert_eq!(hash1, hash2);
    }

    #[tokio::test]
    async fn test_delete_missing_blob_is_ok() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf());

        store.delete(BlobKind::Snapshot, "deadbeef").await.unwrap();
    }

    #[test]
    fn test_ensure_extension_supported() {
        assert!(ensure_extension_supported("roads.geojson").is_ok());
        assert!(ensure_extension_supported("roads.gpkg").is_ok());
        assert!(ensure_extension_supported("roads.shp").is_err());
    }
}
