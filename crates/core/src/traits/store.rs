//! Module persistence traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ModuleRecord, ModuleSummary};

/// Persistent storage for accepted modules.
#[async_trait]
pub trait ModuleStore: Send + Sync {
    /// Save (or replace) a module record.
    async fn save(&self, record: &ModuleRecord) -> Result<()>;

    /// Load a module by ID.
    async fn load(&self, id: &str) -> Result<Option<ModuleRecord>>;

    /// List the most recent modules.
    async fn list(&self, limit: usize) -> Result<Vec<ModuleSummary>>;

    /// Delete a module. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}
