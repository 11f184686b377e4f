//! Filesystem-backed blob storage.

use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Blob store rooted at a storage directory.
///
/// All paths passed in are storage-relative (see
/// [`super::tile_rel_path`]); the root is prepended here and nowhere
/// else.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    root: PathBuf,
}

impl BlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a storage-relative path.
    pub fn absolute(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Writes a blob, creating parent directories, and returns its size.
    pub async fn write(&self, rel_path: &str, bytes: &[u8]) -> io::Result<u64> {
        let path = self.absolute(rel_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        trace!(path = %path.display(), bytes = bytes.len(), "blob written");
        Ok(bytes.len() as u64)
    }

    /// Reads a blob in full. `Ok(None)` when the file does not exist.
    pub async fn read(&self, rel_path: &str) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.absolute(rel_path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes a blob. Missing files are not an error: deletion is used
    /// by cleanup paths that may run after a partial failure.
    pub async fn delete(&self, rel_path: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.absolute(rel_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether a blob exists.
    pub async fn exists(&self, rel_path: &str) -> bool {
        tokio::fs::try_exists(self.absolute(rel_path))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());

        let size = blob.write("tenants/t1/1/0/0_0.png", b"pngdata").await.unwrap();
        assert_eq!(size, 7);

        let bytes = blob.read("tenants/t1/1/0/0_0.png").await.unwrap().unwrap();
        assert_eq!(bytes, b"pngdata");
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        assert!(blob.read("tenants/t1/none.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());

        blob.write("a/b.png", b"x").await.unwrap();
        blob.delete("a/b.png").await.unwrap();
        blob.delete("a/b.png").await.unwrap();
        assert!(!blob.exists("a/b.png").await);
    }
}
