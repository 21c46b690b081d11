//! Bundle sources.
//!
//! A source answers two questions for a normalized path: how large the
//! resource is, and what its bytes are. Size is asked first so the loader
//! can refuse oversized resources without reading them.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;

use playgate_core::{BundlePayload, Error, Result};

use crate::path::{normalize_bundle_path, resolve_under};

#[async_trait]
pub trait BundleSource: Send + Sync {
    /// Size in bytes, or `None` if the path is not in the bundle.
    async fn size(&self, path: &str) -> Result<Option<u64>>;

    /// Full resource bytes.
    async fn read(&self, path: &str) -> Result<Bytes>;
}

/// Bundle held entirely in memory (accepted submissions).
#[derive(Debug, Clone, Default)]
pub struct InMemoryBundle {
    files: HashMap<String, Bytes>,
}

impl InMemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a submitted payload. Paths that fail normalization are
    /// skipped; the validator has already reported them.
    pub fn from_payload(payload: &BundlePayload) -> Self {
        let files = payload
            .files
            .iter()
            .filter_map(|(path, data)| {
                normalize_bundle_path(path)
                    .ok()
                    .map(|p| (p, data.clone()))
            })
            .collect();
        Self { files }
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        let path = normalize_bundle_path(path)?;
        self.files.insert(path, data.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl BundleSource for InMemoryBundle {
    async fn size(&self, path: &str) -> Result<Option<u64>> {
        let path = normalize_bundle_path(path)?;
        Ok(self.files.get(&path).map(|b| b.len() as u64))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let path = normalize_bundle_path(path)?;
        self.files
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::asset(format!("resource not found: {}", path)))
    }
}

/// Bundle unpacked into a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BundleSource for DirectoryBundle {
    async fn size(&self, path: &str) -> Result<Option<u64>> {
        let full = resolve_under(&self.root, path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::asset(format!("stat {}: {}", path, e))),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = resolve_under(&self.root, path)?;
        tokio::fs::read(&full)
            .await
            .map(Bytes::from)
            .map_err(|e| Error::asset(format!("read {}: {}", path, e)))
    }
}
