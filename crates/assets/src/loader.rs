//! Asset loader.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use playgate_core::{AssetCategory, BundleTier, Error, Result};

use crate::decode::{decode, Resource};
use crate::path::normalize_bundle_path;
use crate::source::BundleSource;

/// Result of one preload item. Items fail independently.
#[derive(Debug)]
pub struct PreloadOutcome {
    pub category: AssetCategory,
    pub path: String,
    pub result: Result<Resource>,
}

/// Loads bundle resources under the ceilings of one bundle tier.
#[derive(Clone)]
pub struct AssetLoader {
    source: Arc<dyn BundleSource>,
    tier: BundleTier,
}

impl AssetLoader {
    pub fn new(source: Arc<dyn BundleSource>, tier: BundleTier) -> Self {
        Self { source, tier }
    }

    pub fn tier(&self) -> BundleTier {
        self.tier
    }

    /// Load and decode one resource.
    ///
    /// The size is checked against the category ceiling before any bytes
    /// are read, so an oversized resource never reaches a decoder.
    pub async fn load(&self, category: AssetCategory, path: &str) -> Result<Resource> {
        let path = normalize_bundle_path(path)?;
        let limit = self.tier.category_ceiling(category);

        let size = self
            .source
            .size(&path)
            .await?
            .ok_or_else(|| Error::asset(format!("resource not found: {}", path)))?;
        if size > limit {
            return Err(Error::asset(format!(
                "{} resource '{}' is {} bytes, limit is {} bytes",
                category, path, size, limit
            )));
        }

        let bytes = self.source.read(&path).await?;
        // The source may have changed between stat and read.
        if bytes.len() as u64 > limit {
            return Err(Error::asset(format!(
                "{} resource '{}' grew to {} bytes, limit is {} bytes",
                category,
                path,
                bytes.len(),
                limit
            )));
        }

        let resource = tokio::task::spawn_blocking(move || decode(category, bytes))
            .await
            .map_err(|e| Error::internal(format!("decoder task failed: {}", e)))??;

        debug!(path = %path, category = %category, size, "Asset loaded");
        Ok(resource)
    }

    /// Load many resources concurrently, one outcome per item in input order.
    pub async fn preload(&self, items: &[(AssetCategory, String)]) -> Vec<PreloadOutcome> {
        let loads = items.iter().map(|(category, path)| async move {
            let result = self.load(*category, path).await;
            if let Err(e) = &result {
                warn!(path = %path, category = %category, error = %e, "Asset preload failed");
            }
            PreloadOutcome {
                category: *category,
                path: path.clone(),
                result,
            }
        });
        join_all(loads).await
    }
}
