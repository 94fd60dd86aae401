//! Asset storage abstraction
//!
//! Used by the cover-generation step to store generated images. The
//! production collaborator is external; the filesystem implementation
//! serves single-node deployments and the memory implementation serves
//! tests.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for asset storage
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store bytes under a key, overwriting any previous object
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

/// Filesystem-backed asset store
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        // Keys are produced internally; reject anything path-like anyway.
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(AppError::Asset {
                message: format!("invalid asset key: {}", key),
            });
        }

        let path = self.root.join(Path::new(key));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Asset {
                    message: format!("create {}: {}", parent.display(), e),
                })?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Asset {
                message: format!("write {}: {}", path.display(), e),
            })
    }
}

/// In-memory asset store for tests
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored object
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .lock()
            .expect("asset store lock poisoned")
            .get(key)
            .cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.lock().expect("asset store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .expect("asset store lock poisoned")
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }
}
