//! Artifact storage
//!
//! Captures are persisted as blobs under hierarchical keys of the form
//! `<request-key>/<file>`. Listing a prefix returns the names of its
//! immediate children only.

mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;

/// Key/value blob store with prefix listing
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read the blob stored under `key`
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Write `data` under `key`, replacing any previous blob
    async fn put_bytes(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove `key` and anything stored beneath it; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Names of the immediate children of `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
