//! Sandbox host.
//!
//! Owns every live [`IsolatedInstance`], enforces the instance cap and the
//! one-instance-per-session rule, and preloads bundle resources before a
//! module boots.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use playgate_assets::{normalize_bundle_path, AssetLoader, InMemoryBundle};
use playgate_core::config::SandboxConfig;
use playgate_core::{Error, ModuleRecord, Result};
use playgate_governance::track_live_instances;

use crate::capability::CapabilitySet;
use crate::context::AssetTable;
use crate::engine::ModuleRuntime;
use crate::instance::{InstanceMode, InstanceOptions, IsolatedInstance};

/// Manager of isolated instances.
pub struct SandboxHost {
    runtime: Arc<dyn ModuleRuntime>,
    config: SandboxConfig,
    instances: DashMap<String, Arc<IsolatedInstance>>,
    /// Session id to instance id. Empty while the instance is booting.
    by_session: DashMap<String, String>,
    live: AtomicUsize,
}

impl SandboxHost {
    pub fn new(runtime: Arc<dyn ModuleRuntime>, config: SandboxConfig) -> Self {
        tracing::info!(
            runtime = runtime.name(),
            max_instances = config.max_instances,
            "Sandbox host ready"
        );
        Self {
            runtime,
            config,
            instances: DashMap::new(),
            by_session: DashMap::new(),
            live: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Default options for a new instance in `mode`.
    pub fn options(&self, mode: InstanceMode) -> InstanceOptions {
        InstanceOptions::from_config(&self.config, mode)
    }

    /// Stand up a new isolated instance of `record`.
    ///
    /// Resolves once the module has been loaded and `init` returned. A
    /// module whose bootstrap fails never becomes live.
    pub async fn instantiate(
        &self,
        record: &ModuleRecord,
        options: InstanceOptions,
    ) -> Result<Arc<IsolatedInstance>> {
        let max = self.config.max_instances;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| Error::InstanceLimit(max))?;

        if let Some(session_id) = &options.session_id {
            match self.by_session.entry(session_id.clone()) {
                Entry::Occupied(_) => {
                    self.live.fetch_sub(1, Ordering::AcqRel);
                    return Err(Error::invalid_request(format!(
                        "session {} already owns an instance",
                        session_id
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(String::new());
                }
            }
        }

        let session_id = options.session_id.clone();
        match self.boot(record, options).await {
            Ok(instance) => {
                let instance = Arc::new(instance);
                self.instances
                    .insert(instance.id().to_string(), instance.clone());
                if let Some(session_id) = session_id {
                    self.by_session
                        .insert(session_id, instance.id().to_string());
                }
                track_live_instances(self.live_count());
                Ok(instance)
            }
            Err(e) => {
                if let Some(session_id) = session_id {
                    self.by_session.remove(&session_id);
                }
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    async fn boot(&self, record: &ModuleRecord, options: InstanceOptions) -> Result<IsolatedInstance> {
        let capabilities = CapabilitySet::for_request(&record.shared_capabilities);
        let assets = Arc::new(self.preload(record).await);
        IsolatedInstance::spawn(
            self.runtime.clone(),
            record.clone(),
            capabilities,
            assets,
            options,
        )
        .await
    }

    /// Load every manifest entry of a bundled module. Entries fail
    /// independently; failures are kept in the table for the module.
    async fn preload(&self, record: &ModuleRecord) -> AssetTable {
        let Some(bundle) = &record.bundle else {
            return AssetTable::new();
        };
        let loader = AssetLoader::new(
            Arc::new(InMemoryBundle::from_payload(bundle)),
            record.tier.unwrap_or_default(),
        );
        let items: Vec<_> = bundle
            .manifest
            .entries
            .iter()
            .map(|e| (e.category, e.path.clone()))
            .collect();

        loader
            .preload(&items)
            .await
            .into_iter()
            .map(|outcome| {
                let key = normalize_bundle_path(&outcome.path).unwrap_or(outcome.path);
                (key, outcome.result.map_err(|e| e.to_string()))
            })
            .collect()
    }

    pub fn get(&self, instance_id: &str) -> Result<Arc<IsolatedInstance>> {
        self.instances
            .get(instance_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))
    }

    /// An instance `agent_id` is allowed to drive.
    pub fn get_for(&self, instance_id: &str, agent_id: &str) -> Result<Arc<IsolatedInstance>> {
        let instance = self.get(instance_id)?;
        if !instance.is_owned_by(agent_id) {
            return Err(Error::NotInstanceOwner(instance_id.to_string()));
        }
        Ok(instance)
    }

    pub fn instance_for_session(&self, session_id: &str) -> Option<Arc<IsolatedInstance>> {
        let instance_id = self.by_session.get(session_id)?.value().clone();
        self.instances.get(&instance_id).map(|i| i.value().clone())
    }

    /// Destroy an instance. In-flight calls complete as cancelled.
    pub async fn destroy(&self, instance_id: &str) -> Result<()> {
        let (_, instance) = self
            .instances
            .remove(instance_id)
            .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))?;
        if let Some(session_id) = instance.session_id() {
            self.by_session.remove(session_id);
        }
        instance.shutdown().await;
        self.live.fetch_sub(1, Ordering::AcqRel);
        track_live_instances(self.live_count());
        tracing::info!(instance_id, game_id = instance.game_id(), "Instance destroyed");
        Ok(())
    }

    pub async fn destroy_all(&self) {
        let ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let _ = self.destroy(&id).await;
        }
    }

    /// Destroy instances outside any session whose last bridge call is at
    /// least `max_idle` old. Session instances end with their session.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let idle: Vec<String> = self
            .instances
            .iter()
            .filter(|e| e.value().session_id().is_none())
            .filter(|e| {
                (now - e.value().last_active())
                    .to_std()
                    .is_ok_and(|idle| idle >= max_idle)
            })
            .map(|e| e.key().clone())
            .collect();

        let mut reaped = 0;
        for instance_id in idle {
            // Gone already if a DELETE raced the sweep.
            if self.destroy(&instance_id).await.is_ok() {
                reaped += 1;
            }
        }
        if reaped > 0 {
            tracing::info!(reaped, "Idle instances destroyed");
        }
        reaped
    }

    /// Run `reap_idle` on the configured interval.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let host = self.clone();
        let ttl = Duration::from_secs(self.config.instance_idle_ttl_secs);
        let period = Duration::from_secs(self.config.instance_reap_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                host.reap_idle(ttl).await;
            }
        })
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn list(&self) -> Vec<Arc<IsolatedInstance>> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }
}
