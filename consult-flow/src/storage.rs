use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Keyed store for workflow checkpoints and results.
///
/// An artifact that exists is complete: implementations must never expose a
/// partially written value under its key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Load and decode a JSON artifact.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    key: &str,
) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode a value as pretty JSON and store it. Returns the stored bytes.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn ArtifactStore,
    key: &str,
    value: &T,
) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.save(key, bytes.clone()).await?;
    Ok(bytes)
}

/// Artifacts as files in one directory, written through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let root = self.root.clone();
        let target = self.path_for(key);

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&root)?;
            let mut staged = tempfile::NamedTempFile::new_in(&root)?;
            staged.write_all(&bytes)?;
            staged.as_file().sync_all()?;
            staged.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| FlowError::StorageError(format!("artifact writer panicked: {e}")))??;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// In-memory implementation of ArtifactStore
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Arc<DashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.artifacts.get(key).map(|entry| entry.clone()))
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.artifacts.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.artifacts.contains_key(key))
    }
}
