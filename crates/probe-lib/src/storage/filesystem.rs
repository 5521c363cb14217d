//! Filesystem-backed artifact store

use super::ArtifactStore;
use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores each key as a file below a base directory
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    base_path: PathBuf,
}

impl FilesystemStore {
    /// Create a store rooted at `base_path`, creating the directory if needed
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| ProbeError::storage(base_path.display().to_string(), e))?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a key to a path, rejecting anything that escapes the base directory
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ProbeError::storage(
                key,
                io::Error::new(ErrorKind::InvalidInput, "key escapes the storage root"),
            ));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ProbeError::storage(key, e))
    }

    async fn put_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProbeError::storage(key, e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| ProbeError::storage(key, e))?;
        debug!(key = %key, bytes = data.len(), "Stored artifact");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ProbeError::storage(key, e)),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.map_err(|e| ProbeError::storage(key, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProbeError::storage(prefix, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProbeError::storage(prefix, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, FilesystemStore) {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::open(dir.path().join("artifacts"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, store) = open_store().await;
        store
            .put_bytes("prod/default/api-0_1700000000000/heap.bin", b"raw")
            .await
            .unwrap();

        let data = store
            .get_bytes("prod/default/api-0_1700000000000/heap.bin")
            .await
            .unwrap();
        assert_eq!(data, b"raw");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_storage_error() {
        let (_dir, store) = open_store().await;
        let result = store.get_bytes("prod/none.svg").await;
        assert!(matches!(result, Err(ProbeError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_list_returns_immediate_children() {
        let (_dir, store) = open_store().await;
        store
            .put_bytes("prod/default/api-0_1700000000000/heap.bin", b"a")
            .await
            .unwrap();
        store
            .put_bytes("prod/default/api-1_1700000000500/block.bin", b"b")
            .await
            .unwrap();

        let names = store.list("prod/default").await.unwrap();
        assert_eq!(
            names,
            vec![
                "api-0_1700000000000".to_string(),
                "api-1_1700000000500".to_string()
            ]
        );
        assert!(store.list("prod/other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let (_dir, store) = open_store().await;
        store
            .put_bytes("prod/default/api-0_1/heap.bin", b"a")
            .await
            .unwrap();
        store
            .put_bytes("prod/default/api-0_1/heap_flame.svg", b"b")
            .await
            .unwrap();

        store.delete("prod/default/api-0_1").await.unwrap();
        assert!(store.list("prod/default").await.unwrap().is_empty());
        store.delete("prod/default/api-0_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = open_store().await;
        assert!(store.put_bytes("../outside.bin", b"x").await.is_err());
        assert!(store.get_bytes("prod/../../etc/passwd").await.is_err());
    }
}
