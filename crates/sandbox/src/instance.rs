//! Isolated game instances.
//!
//! Every instance owns one OS thread. The module value, its context and all
//! of its state live on that thread and are reached only through bridge
//! messages. Rendering leaves the thread as [`DisplayList`] snapshots on a
//! watch channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use playgate_core::config::SandboxConfig;
use playgate_core::{
    Action, BridgeErrorKind, BridgeResponse, Error, GameMeta, GameState, ModuleRecord, Operation,
    Result,
};
use playgate_governance::track_runtime_fault;

use crate::bridge::{into_result, BridgeClient, Inbound};
use crate::capability::CapabilitySet;
use crate::context::{AssetTable, ContextSettings, DisplayList, SandboxContext};
use crate::engine::ModuleRuntime;
use crate::module::{GameModule, ModuleFault};

/// Faults kept per instance.
const MAX_FAULT_RECORDS: usize = 64;

// =============================================================================
// Options
// =============================================================================

/// How game time advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceMode {
    /// Time advances by one step per accepted input. Used for agent
    /// sessions so that play is deterministic and turn-based.
    Stepped,
    /// Time advances on a wall-clock frame interval. Used for the rendering
    /// client.
    Realtime,
}

#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub mode: InstanceMode,
    /// Session that owns the instance, if any.
    pub session_id: Option<String>,
    /// Agent allowed to drive the instance.
    pub owner: Option<String>,
    pub call_timeout: Duration,
    pub bootstrap_timeout: Duration,
    pub frame_interval: Duration,
    /// Game time per step in stepped mode.
    pub step_ms: f64,
    pub width: u32,
    pub height: u32,
    pub rng_seed: Option<u64>,
}

impl InstanceOptions {
    pub fn from_config(config: &SandboxConfig, mode: InstanceMode) -> Self {
        Self {
            mode,
            session_id: None,
            owner: None,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            bootstrap_timeout: Duration::from_millis(config.bootstrap_timeout_ms),
            frame_interval: Duration::from_millis(config.frame_interval_ms.max(1)),
            step_ms: config.step_ms as f64,
            width: config.surface_width,
            height: config.surface_height,
            rng_seed: config.rng_seed,
        }
    }

    pub fn stepped(config: &SandboxConfig) -> Self {
        Self::from_config(config, InstanceMode::Stepped)
    }

    pub fn realtime(config: &SandboxConfig) -> Self {
        Self::from_config(config, InstanceMode::Realtime)
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn owned_by(mut self, agent_id: impl Into<String>) -> Self {
        self.owner = Some(agent_id.into());
        self
    }
}

// =============================================================================
// Phase & Faults
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InstancePhase {
    Booting = 0,
    Ready = 1,
    /// Bootstrap failed or the instance thread died.
    Failed = 2,
    Destroyed = 3,
}

impl InstancePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Booting,
            1 => Self::Ready,
            2 => Self::Failed,
            _ => Self::Destroyed,
        }
    }
}

/// A bridge failure observed by the host.
#[derive(Debug, Clone, Serialize)]
pub struct FaultRecord {
    pub operation: Operation,
    pub kind: BridgeErrorKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Isolated Instance (host side)
// =============================================================================

/// Host handle for one running module.
pub struct IsolatedInstance {
    id: String,
    game_id: String,
    session_id: Option<String>,
    owner: Option<String>,
    mode: InstanceMode,
    capabilities: Arc<CapabilitySet>,
    bridge: BridgeClient,
    frames: watch::Receiver<DisplayList>,
    phase: Arc<AtomicU8>,
    faults: Mutex<Vec<FaultRecord>>,
    created_at: DateTime<Utc>,
    /// Unix millis of the last bridge call.
    last_active: AtomicI64,
}

impl IsolatedInstance {
    /// Start the instance thread, load the module and run `init`.
    pub(crate) async fn spawn(
        runtime: Arc<dyn ModuleRuntime>,
        record: ModuleRecord,
        capabilities: Arc<CapabilitySet>,
        assets: Arc<AssetTable>,
        options: InstanceOptions,
    ) -> Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        let game_id = record.id.clone();

        let (req_tx, req_rx) = std_mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = watch::channel(DisplayList::default());
        let (boot_tx, boot_rx) = oneshot::channel();

        let settings = ContextSettings {
            capabilities: capabilities.clone(),
            width: options.width,
            height: options.height,
            rng_seed: options.rng_seed,
            assets,
        };
        let worker_options = options.clone();
        std::thread::Builder::new()
            .name(format!("playgate-{}", &id[..8]))
            .spawn(move || {
                run_instance(
                    runtime,
                    record,
                    settings,
                    worker_options,
                    req_rx,
                    resp_tx,
                    frame_tx,
                    boot_tx,
                )
            })
            .map_err(|e| Error::internal(format!("failed to spawn instance thread: {}", e)))?;

        let phase = Arc::new(AtomicU8::new(InstancePhase::Booting as u8));
        let exit_phase = phase.clone();
        let exit_id = id.clone();
        let bridge = BridgeClient::spawn(id.clone(), req_tx, resp_rx, options.call_timeout, move || {
            let was_running = exit_phase
                .compare_exchange(
                    InstancePhase::Ready as u8,
                    InstancePhase::Failed as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if was_running {
                tracing::error!(instance_id = %exit_id, "Instance thread exited unexpectedly");
            }
        });

        let instance = Self {
            id,
            game_id,
            session_id: options.session_id.clone(),
            owner: options.owner.clone(),
            mode: options.mode,
            capabilities,
            bridge,
            frames: frame_rx,
            phase,
            faults: Mutex::new(Vec::new()),
            created_at: Utc::now(),
            last_active: AtomicI64::new(Utc::now().timestamp_millis()),
        };

        let boot = match tokio::time::timeout(options.bootstrap_timeout, boot_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_)) => Err("instance thread exited during bootstrap".to_string()),
            // The thread cannot be killed; it is detached and exits once
            // init returns and it sees the closed channels.
            Err(_) => Err(format!(
                "module did not finish init within {:?}",
                options.bootstrap_timeout
            )),
        };

        match boot {
            Ok(()) => {
                instance.set_phase(InstancePhase::Ready);
                tracing::info!(
                    instance_id = %instance.id,
                    game_id = %instance.game_id,
                    mode = ?instance.mode,
                    "Instance running"
                );
                Ok(instance)
            }
            Err(reason) => {
                instance.set_phase(InstancePhase::Failed);
                instance.bridge.close(BridgeErrorKind::InstanceGone).await;
                tracing::warn!(
                    instance_id = %instance.id,
                    game_id = %instance.game_id,
                    reason = %reason,
                    "Instance bootstrap failed"
                );
                Err(Error::bootstrap(reason))
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Whether `agent_id` may drive this instance. Unowned instances are
    /// open to everyone.
    pub fn is_owned_by(&self, agent_id: &str) -> bool {
        self.owner.as_deref().map_or(true, |owner| owner == agent_id)
    }

    pub fn mode(&self) -> InstanceMode {
        self.mode
    }

    pub fn phase(&self) -> InstancePhase {
        InstancePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last bridge call (or of creation).
    pub fn last_active(&self) -> DateTime<Utc> {
        let millis = self.last_active.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(millis).unwrap_or(self.created_at)
    }

    /// The most recently published frame.
    pub fn latest_frame(&self) -> DisplayList {
        self.frames.borrow().clone()
    }

    /// Receiver notified on every published frame.
    pub fn subscribe_frames(&self) -> watch::Receiver<DisplayList> {
        self.frames.clone()
    }

    /// Faults observed so far, oldest first.
    pub async fn faults(&self) -> Vec<FaultRecord> {
        self.faults.lock().await.clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.bridge.in_flight().await
    }

    // =========================================================================
    // Bridge operations
    // =========================================================================

    /// Raw bridge call. Failures are recorded but not converted.
    pub async fn call(&self, operation: Operation, args: Value) -> BridgeResponse {
        self.last_active
            .store(Utc::now().timestamp_millis(), Ordering::Release);
        let response = self.bridge.call(operation, args).await;
        if let Some(kind) = response.error_kind {
            self.record_fault(operation, kind, response.detail.as_deref().unwrap_or(""))
                .await;
        }
        response
    }

    async fn invoke(&self, operation: Operation, args: Value) -> Result<Value> {
        into_result(operation, self.call(operation, args).await)
    }

    pub async fn init(&self) -> Result<()> {
        self.invoke(Operation::Init, Value::Null).await.map(|_| ())
    }

    pub async fn start(&self) -> Result<()> {
        self.invoke(Operation::Start, Value::Null).await.map(|_| ())
    }

    pub async fn reset(&self) -> Result<()> {
        self.invoke(Operation::Reset, Value::Null).await.map(|_| ())
    }

    pub async fn read_state(&self) -> Result<GameState> {
        let value = self.invoke(Operation::ReadState, Value::Null).await?;
        GameState::from_value(value).map_err(|detail| {
            Error::runtime_fault(Operation::ReadState, BridgeErrorKind::InvalidResult, detail)
        })
    }

    pub async fn read_meta(&self) -> Result<GameMeta> {
        let value = self.invoke(Operation::ReadMeta, Value::Null).await?;
        GameMeta::from_value(value).map_err(|detail| {
            Error::runtime_fault(Operation::ReadMeta, BridgeErrorKind::InvalidResult, detail)
        })
    }

    /// Deliver one input token.
    ///
    /// Returns `Ok(false)` for tokens outside the action set and for inputs
    /// whose handler raised; the instance stays usable either way. Timeouts
    /// and a dead instance are errors.
    pub async fn dispatch_input(&self, token: &str) -> Result<bool> {
        let Ok(action) = token.parse::<Action>() else {
            tracing::debug!(instance_id = %self.id, token, "Ignoring unknown input token");
            return Ok(false);
        };

        let response = self
            .call(Operation::DispatchInput, json!({ "action": action.token() }))
            .await;
        match (response.ok, response.error_kind) {
            (true, _) => match response.result {
                Some(Value::Bool(accepted)) => Ok(accepted),
                other => Err(Error::runtime_fault(
                    Operation::DispatchInput,
                    BridgeErrorKind::InvalidResult,
                    format!("expected a boolean, got {:?}", other),
                )),
            },
            (false, Some(BridgeErrorKind::ModuleException)) => Ok(false),
            (false, _) => into_result(Operation::DispatchInput, response).map(|_| false),
        }
    }

    /// Tear down: fail in-flight calls as cancelled and stop the thread.
    pub(crate) async fn shutdown(&self) -> usize {
        self.set_phase(InstancePhase::Destroyed);
        let cancelled = self.bridge.close(BridgeErrorKind::Cancelled).await;
        if cancelled > 0 {
            tracing::info!(instance_id = %self.id, cancelled, "Cancelled in-flight calls");
        }
        cancelled
    }

    fn set_phase(&self, phase: InstancePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    async fn record_fault(&self, operation: Operation, kind: BridgeErrorKind, detail: &str) {
        tracing::warn!(
            instance_id = %self.id,
            game_id = %self.game_id,
            operation = %operation,
            kind = %kind,
            detail,
            "Runtime fault"
        );
        track_runtime_fault(operation.name(), kind.as_str());

        let mut faults = self.faults.lock().await;
        if faults.len() == MAX_FAULT_RECORDS {
            faults.remove(0);
        }
        faults.push(FaultRecord {
            operation,
            kind,
            detail: detail.to_string(),
            at: Utc::now(),
        });
    }
}

impl std::fmt::Debug for IsolatedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedInstance")
            .field("id", &self.id)
            .field("game_id", &self.game_id)
            .field("session_id", &self.session_id)
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("phase", &self.phase())
            .finish()
    }
}

// =============================================================================
// Instance thread
// =============================================================================

/// A failed call as the thread reports it.
struct CallError {
    kind: BridgeErrorKind,
    detail: String,
}

impl CallError {
    fn new(kind: BridgeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<ModuleFault> for CallError {
    fn from(fault: ModuleFault) -> Self {
        Self::new(BridgeErrorKind::ModuleException, fault.0)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

#[allow(clippy::too_many_arguments)]
fn run_instance(
    runtime: Arc<dyn ModuleRuntime>,
    record: ModuleRecord,
    settings: ContextSettings,
    options: InstanceOptions,
    requests: std_mpsc::Receiver<Inbound>,
    responses: mpsc::UnboundedSender<BridgeResponse>,
    frames: watch::Sender<DisplayList>,
    boot: oneshot::Sender<std::result::Result<(), String>>,
) {
    let mut ctx = SandboxContext::new(settings);

    let loaded = catch_unwind(AssertUnwindSafe(|| {
        let mut module = runtime.load(&record)?;
        module.init(&mut ctx)?;
        Ok::<_, ModuleFault>(module)
    }));
    let module = match loaded {
        Ok(Ok(module)) => module,
        Ok(Err(fault)) => {
            let _ = boot.send(Err(format!("init failed: {}", fault)));
            return;
        }
        Err(payload) => {
            let _ = boot.send(Err(format!("init failed: {}", panic_message(payload))));
            return;
        }
    };
    frames.send_replace(ctx.display_list());
    if boot.send(Ok(())).is_err() {
        // Host gave up waiting.
        return;
    }

    let mut worker = Worker {
        module,
        ctx,
        frames,
        meta: None,
        mode: options.mode,
        step_ms: options.step_ms,
    };

    let interval = options.frame_interval;
    let mut next_tick = Instant::now() + interval;
    loop {
        let inbound = match worker.mode {
            InstanceMode::Stepped => requests
                .recv()
                .map_err(|_| std_mpsc::RecvTimeoutError::Disconnected),
            InstanceMode::Realtime => {
                let now = Instant::now();
                if now >= next_tick {
                    worker.advance(interval.as_secs_f64() * 1000.0);
                    // Skip missed ticks instead of bursting to catch up.
                    next_tick = now + interval;
                    continue;
                }
                requests.recv_timeout(next_tick - now)
            }
        };

        match inbound {
            Ok(Inbound::Call(request)) => {
                let response = worker.handle(request.correlation_id, request.operation, &request.args);
                if responses.send(response).is_err() {
                    break;
                }
            }
            Ok(Inbound::Shutdown) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
    tracing::debug!(game_id = %record.id, "Instance thread exiting");
}

struct Worker {
    module: Box<dyn GameModule>,
    ctx: SandboxContext,
    frames: watch::Sender<DisplayList>,
    /// First valid `readMeta` result.
    meta: Option<Value>,
    mode: InstanceMode,
    step_ms: f64,
}

impl Worker {
    fn handle(&mut self, correlation_id: u64, operation: Operation, args: &Value) -> BridgeResponse {
        match catch_unwind(AssertUnwindSafe(|| self.apply(operation, args))) {
            Ok(Ok(value)) => BridgeResponse::success(correlation_id, value),
            Ok(Err(err)) => BridgeResponse::failure(correlation_id, err.kind, err.detail),
            Err(payload) => BridgeResponse::failure(
                correlation_id,
                BridgeErrorKind::ModuleException,
                panic_message(payload),
            ),
        }
    }

    fn apply(&mut self, operation: Operation, args: &Value) -> std::result::Result<Value, CallError> {
        match operation {
            Operation::Init => {
                self.module.init(&mut self.ctx)?;
                self.publish();
                Ok(Value::Null)
            }
            Operation::Start => {
                self.module.start(&mut self.ctx)?;
                self.publish();
                Ok(Value::Null)
            }
            Operation::Reset => {
                self.ctx.clear_schedules();
                self.module.reset(&mut self.ctx)?;
                self.publish();
                Ok(Value::Null)
            }
            Operation::ReadState => {
                let raw = self.module.read_state()?;
                let state = GameState::from_value(raw)
                    .map_err(|e| CallError::new(BridgeErrorKind::InvalidResult, e))?;
                serde_json::to_value(state)
                    .map_err(|e| CallError::new(BridgeErrorKind::InvalidResult, e.to_string()))
            }
            Operation::ReadMeta => {
                let raw = self.module.read_meta()?;
                GameMeta::from_value(raw.clone())
                    .map_err(|e| CallError::new(BridgeErrorKind::InvalidResult, e))?;
                match &self.meta {
                    Some(first) if *first != raw => Err(CallError::new(
                        BridgeErrorKind::InvalidResult,
                        "readMeta changed during the instance lifetime",
                    )),
                    Some(_) => Ok(raw),
                    None => {
                        self.meta = Some(raw.clone());
                        Ok(raw)
                    }
                }
            }
            Operation::DispatchInput => {
                let token = args
                    .get("action")
                    .or(Some(args))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CallError::new(BridgeErrorKind::InvalidArguments, "missing 'action'")
                    })?;
                let Ok(action) = token.parse::<Action>() else {
                    return Ok(Value::Bool(false));
                };
                let accepted = self.module.dispatch_input(&mut self.ctx, action)?;
                if accepted && self.mode == InstanceMode::Stepped {
                    self.advance(self.step_ms);
                }
                Ok(Value::Bool(accepted))
            }
        }
    }

    /// Advance game time by one frame and publish it. Faults raised by
    /// timer or frame callbacks are logged and do not stop the loop.
    fn advance(&mut self, dt_ms: f64) {
        let outcome = catch_unwind(AssertUnwindSafe(|| -> std::result::Result<(), ModuleFault> {
            for timer in self.ctx.advance_clock(dt_ms) {
                self.module.on_timer(&mut self.ctx, timer)?;
            }
            if self.ctx.begin_frame() {
                self.module.on_frame(&mut self.ctx, dt_ms)?;
            }
            Ok(())
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => tracing::warn!(error = %fault, "Frame callback failed"),
            Err(payload) => tracing::warn!(error = %panic_message(payload), "Frame callback panicked"),
        }
        self.publish();
    }

    fn publish(&self) {
        self.frames.send_replace(self.ctx.display_list());
    }
}
