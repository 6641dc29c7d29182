//! Filesystem-backed object store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{validate_key, ObjectStore, StorageError, StoredObject};

/// Stores objects as files under a root directory
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never sees a half-written object.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Prefix used to build `StoredObject::public_url`
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;

        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let temp = target.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        fs::write(&temp, &bytes).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(key, content_type, bytes = bytes.len(), "Stored object on disk");

        Ok(StoredObject {
            key: key.to_string(),
            public_url: self
                .public_base_url
                .as_ref()
                .map(|base| format!("{}/{}", base, key)),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
