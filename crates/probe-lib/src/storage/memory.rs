//! In-process artifact store

use super::ArtifactStore;
use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, ErrorKind};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Artifact store kept entirely in memory, used for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

fn normalize(key: &str) -> &str {
    key.trim_matches('/')
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(normalize(key))
            .cloned()
            .ok_or_else(|| {
                ProbeError::storage(key, io::Error::new(ErrorKind::NotFound, "no such artifact"))
            })
    }

    async fn put_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert(normalize(key).to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize(key);
        let nested = format!("{key}/");
        self.blobs
            .write()
            .await
            .retain(|k, _| k != key && !k.starts_with(&nested));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", normalize(prefix));
        let blobs = self.blobs.read().await;
        let children: BTreeSet<String> = blobs
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect();
        Ok(children.into_iter().collect())
    }
}
