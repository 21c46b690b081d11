use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub session: SessionConfig,
    pub rate_limits: RateLimitConfig,
    pub store: StoreConfig,
    pub governance: GovernanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a multipart submission body.
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Bound on every bridge call.
    pub call_timeout_ms: u64,
    /// Bound on module load plus `init`.
    pub bootstrap_timeout_ms: u64,
    /// Frame interval for realtime (UI) instances.
    pub frame_interval_ms: u64,
    /// Simulated time per frame for stepped (agent) instances.
    pub step_ms: u64,
    pub max_instances: usize,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Fixed seed for the instance RNG; random per instance when unset.
    pub rng_seed: Option<u64>,
    /// Backend that executes accepted modules.
    pub runtime: RuntimeKind,
    /// Heap ceiling for one script instance.
    pub script_memory_mb: u64,
    /// UI instances with no bridge call for this long are destroyed.
    pub instance_idle_ttl_secs: u64,
    pub instance_reap_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Run the submitted script in an embedded interpreter.
    Script,
    /// Play the built-in demo game for every module.
    Demo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Sessions idle longer than this are ended and settled.
    pub idle_ttl_secs: u64,
    pub reap_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub submissions_per_day: u32,
    pub calls_per_hour: u32,
    pub sessions_per_hour: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database for module records; in-memory when unset.
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernanceConfig {
    pub json_logs: bool,
    pub enable_metrics: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("PLAYGATE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SERVER__PORT=3000 to server.port
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 3000,
                max_body_bytes: 128 * 1024 * 1024,
            },
            sandbox: SandboxConfig {
                call_timeout_ms: 2_000,
                bootstrap_timeout_ms: 5_000,
                frame_interval_ms: 16,
                step_ms: 16,
                max_instances: 256,
                surface_width: 800,
                surface_height: 600,
                rng_seed: None,
                runtime: RuntimeKind::Script,
                script_memory_mb: 64,
                instance_idle_ttl_secs: 300,
                instance_reap_interval_secs: 30,
            },
            session: SessionConfig {
                idle_ttl_secs: 900,
                reap_interval_secs: 60,
            },
            rate_limits: RateLimitConfig {
                submissions_per_day: 20,
                calls_per_hour: 1_000,
                sessions_per_hour: 10,
            },
            store: StoreConfig { sqlite_path: None },
            governance: GovernanceConfig {
                json_logs: false,
                enable_metrics: true,
            },
        }
    }
}
