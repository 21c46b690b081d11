//! Module runtimes.
//!
//! A [`ModuleRuntime`] turns an accepted module record into a live
//! [`GameModule`]. It is the seam where a script interpreter plugs in; the
//! [`NativeRuntime`] shipped here resolves modules to registered Rust
//! implementations.

use dashmap::DashMap;
use std::sync::Arc;

use playgate_core::ModuleRecord;

use crate::module::{GameModule, ModuleFault, ModuleResult};

/// Builds a module for one record. Called on the instance thread.
pub type ModuleFactory =
    Arc<dyn Fn(&ModuleRecord) -> ModuleResult<Box<dyn GameModule>> + Send + Sync>;

/// Trait for module execution backends.
pub trait ModuleRuntime: Send + Sync {
    /// Load a module. Runs on the instance thread before `init`.
    fn load(&self, record: &ModuleRecord) -> ModuleResult<Box<dyn GameModule>>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Runtime resolving game ids to registered factories.
pub struct NativeRuntime {
    factories: DashMap<String, ModuleFactory>,
    fallback: Option<ModuleFactory>,
}

impl NativeRuntime {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            fallback: None,
        }
    }

    /// Factory used for game ids with no registration.
    pub fn with_fallback<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ModuleRecord) -> ModuleResult<Box<dyn GameModule>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(factory));
        self
    }

    /// Register (or replace) the factory for a game id.
    pub fn register<F>(&self, game_id: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleRecord) -> ModuleResult<Box<dyn GameModule>> + Send + Sync + 'static,
    {
        let game_id = game_id.into();
        tracing::debug!(game_id = %game_id, "Native module registered");
        self.factories.insert(game_id, Arc::new(factory));
    }

    pub fn is_registered(&self, game_id: &str) -> bool {
        self.factories.contains_key(game_id)
    }
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRuntime for NativeRuntime {
    fn load(&self, record: &ModuleRecord) -> ModuleResult<Box<dyn GameModule>> {
        // Clone the factory out so the map shard is not held while it runs.
        let factory = self
            .factories
            .get(&record.id)
            .map(|f| f.value().clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                ModuleFault::new(format!("no native implementation for game {}", record.id))
            })?;
        factory(record)
    }

    fn name(&self) -> &str {
        "native"
    }
}
