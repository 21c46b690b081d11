#![deny(unused)]
//! Playgate - Gate & Bridge for agent-authored game modules
//!
//! Accepts untrusted game modules, validates them statically, runs them in
//! isolated instances and lets remote agents play them through sessions.

use std::sync::Arc;
use std::time::Duration;

use playgate_core::config::{AppConfig, RuntimeKind};
use playgate_core::traits::{ModuleStore, ScoreSink};
use playgate_gateway::{AppState, GatewayConfig, GatewayServer, SubmissionService};
use playgate_governance::FixedWindowRateLimiter;
use playgate_sandbox::{DemoGame, GameModule, ModuleRuntime, NativeRuntime, SandboxHost, ScriptRuntime};
use playgate_session::SessionManager;
use playgate_store::{InMemoryModuleStore, InMemoryScoreLedger, SqliteModuleStore, SqliteScoreLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config ({}); using defaults", e);
            AppConfig::default()
        }
    };

    // Initialize tracing
    playgate_governance::configure_tracing(config.governance.json_logs)?;

    tracing::info!("Starting Playgate v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Stores
    // =========================================================================
    let (store, ledger): (Arc<dyn ModuleStore>, Arc<dyn ScoreSink>) =
        match &config.store.sqlite_path {
            Some(path) => {
                tracing::info!(path = %path, "Initializing SQLite module store and ledger");
                (
                    Arc::new(SqliteModuleStore::new(path)?),
                    Arc::new(SqliteScoreLedger::new(path)?),
                )
            }
            None => {
                tracing::info!("Initializing in-memory module store and ledger");
                (
                    Arc::new(InMemoryModuleStore::new()),
                    Arc::new(InMemoryScoreLedger::new()),
                )
            }
        };

    // =========================================================================
    // Isolation boundary
    // =========================================================================
    let runtime: Arc<dyn ModuleRuntime> = match config.sandbox.runtime {
        RuntimeKind::Script => Arc::new(ScriptRuntime::from_config(&config.sandbox)),
        // Every module plays the built-in demo game.
        RuntimeKind::Demo => Arc::new(
            NativeRuntime::new()
                .with_fallback(|_| Ok(Box::new(DemoGame::new()) as Box<dyn GameModule>)),
        ),
    };
    let host = Arc::new(SandboxHost::new(runtime, config.sandbox.clone()));
    let _instance_reaper = host.spawn_reaper();
    tracing::info!(
        runtime = ?config.sandbox.runtime,
        max_instances = config.sandbox.max_instances,
        call_timeout_ms = config.sandbox.call_timeout_ms,
        "Sandbox host initialized"
    );

    // =========================================================================
    // Sessions & rate limits
    // =========================================================================
    let limiter = Arc::new(FixedWindowRateLimiter::new(config.rate_limits.clone()));
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        host.clone(),
        limiter.clone(),
        ledger,
        config.session.clone(),
    ));
    let _reaper = sessions.spawn_reaper();

    {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup();
                tracing::debug!(tracked = limiter.tracked(), "Rate limit windows pruned");
            }
        });
    }

    // =========================================================================
    // Gateway
    // =========================================================================
    let gateway_config = GatewayConfig::from(&config.server);
    let mut server = GatewayServer::new(
        gateway_config.clone(),
        AppState {
            submissions: SubmissionService::new(store.clone(), limiter.clone()),
            store,
            sessions,
            host: host.clone(),
            limiter,
        },
    );

    if config.governance.enable_metrics {
        server = server.with_metrics(playgate_governance::setup_metrics_recorder()?);
    }

    tracing::info!(
        host = %gateway_config.host,
        port = gateway_config.port,
        "Gateway initialized"
    );

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    host.destroy_all().await;
    tracing::info!("Playgate stopped");
    Ok(())
}
