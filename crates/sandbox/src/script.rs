//! Script runtime.
//!
//! Runs the submitted module source in an embedded QuickJS interpreter.
//! Each instance gets its own interpreter runtime with a heap ceiling and an
//! interrupt deadline per call. The global scope holds the language
//! intrinsics plus the bindings installed by `prelude.js`: surface, frame
//! requests, `performance.now`, a seeded `Math.random`, timers, inline media
//! decoding, preloaded assets and any granted shared library. QuickJS has no
//! storage, network or navigation objects of its own.
//!
//! Module code never calls into the [`SandboxContext`] directly. Drawing,
//! frame requests and timers are buffered by the prelude and applied to the
//! context after each call returns.

use rquickjs::{Context, Ctx, Function, Object, Runtime};
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use playgate_assets::Resource;
use playgate_core::config::SandboxConfig;
use playgate_core::{Action, ModuleRecord};

use crate::context::{Color, MediaDecoder, SandboxContext, TimerId, MAX_DRAW_COMMANDS, MAX_TIMERS};
use crate::engine::ModuleRuntime;
use crate::module::{GameModule, ModuleFault, ModuleResult};
use crate::shared::{Body, Physics2d};

const PRELUDE: &str = include_str!("prelude.js");

/// Name of the frozen host object defined by the prelude.
const HOST: &str = "__playgate";

/// Interpreter stack ceiling.
const MAX_STACK_BYTES: usize = 512 * 1024;

// =============================================================================
// Runtime
// =============================================================================

/// Limits applied to every script instance.
#[derive(Debug, Clone, Copy)]
pub struct ScriptLimits {
    /// Deadline for evaluating the source plus `init`.
    pub bootstrap_budget: Duration,
    /// Deadline for every later call, including frame and timer callbacks.
    pub call_budget: Duration,
    pub memory_bytes: usize,
}

impl ScriptLimits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            bootstrap_budget: Duration::from_millis(config.bootstrap_timeout_ms),
            call_budget: Duration::from_millis(config.call_timeout_ms),
            memory_bytes: (config.script_memory_mb as usize).saturating_mul(1024 * 1024),
        }
    }
}

/// Runtime executing module source with QuickJS.
pub struct ScriptRuntime {
    limits: ScriptLimits,
}

impl ScriptRuntime {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(ScriptLimits::from_config(config))
    }
}

impl ModuleRuntime for ScriptRuntime {
    fn load(&self, record: &ModuleRecord) -> ModuleResult<Box<dyn GameModule>> {
        let module = ScriptModule::new(record, self.limits)?;
        tracing::debug!(game_id = %record.id, bytes = record.source.len(), "Script module loaded");
        Ok(Box::new(module))
    }

    fn name(&self) -> &str {
        "script"
    }
}

// =============================================================================
// Call results
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Draw {
    Clear {
        color: Color,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Color,
    },
    Circle {
        x: f64,
        y: f64,
        r: f64,
        color: Color,
    },
    Polygon {
        points: Vec<(f64, f64)>,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        size: f64,
        text: String,
        color: Color,
    },
    Sprite {
        asset: String,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
    Mesh {
        vertices: Vec<[f64; 3]>,
        triangles: Vec<[usize; 3]>,
        color: Color,
    },
}

/// Side effects buffered by the prelude during one call.
#[derive(Debug, Default, Deserialize)]
struct Effects {
    #[serde(default)]
    draw: Vec<Draw>,
    #[serde(default)]
    dropped: usize,
    #[serde(default)]
    frame: bool,
    /// `(script timer id, delay ms)`
    #[serde(default)]
    schedule: Vec<(u64, f64)>,
    #[serde(default)]
    cancel: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    #[serde(default)]
    ok: Value,
    error: Option<String>,
    #[serde(default)]
    pending: bool,
    #[serde(default)]
    effects: Effects,
}

/// What the host asks the script to run.
enum Entry<'a> {
    Game { operation: &'a str, args: Value },
    Frame { dt_ms: f64 },
    Timer { id: u64 },
}

// =============================================================================
// Script Module
// =============================================================================

/// One module source running in its own interpreter.
pub struct ScriptModule {
    source: String,
    game_id: String,
    context: Context,
    runtime: Runtime,
    /// Interrupt deadline for the call in progress.
    deadline: Rc<Cell<Option<Instant>>>,
    limits: ScriptLimits,
    /// Game time of the last call made with a context.
    now_ms: Cell<f64>,
    host_timers: HashMap<u64, TimerId>,
    script_timers: HashMap<TimerId, u64>,
}

impl ScriptModule {
    fn new(record: &ModuleRecord, limits: ScriptLimits) -> ModuleResult<Self> {
        let runtime = Runtime::new().map_err(|e| ModuleFault::new(format!("interpreter: {}", e)))?;
        runtime.set_memory_limit(limits.memory_bytes);
        runtime.set_max_stack_size(MAX_STACK_BYTES);

        let deadline: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
        let watch = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            watch.get().is_some_and(|at| Instant::now() >= at)
        })));

        let context =
            Context::full(&runtime).map_err(|e| ModuleFault::new(format!("interpreter: {}", e)))?;

        let module = Self {
            source: record.source.clone(),
            game_id: record.id.clone(),
            context,
            runtime,
            deadline,
            limits,
            now_ms: Cell::new(0.0),
            host_timers: HashMap::new(),
            script_timers: HashMap::new(),
        };
        module.install_prelude()?;
        Ok(module)
    }

    fn install_prelude(&self) -> ModuleResult<()> {
        self.arm(self.limits.bootstrap_budget);
        let result = self.context.with(|js| {
            let globals = js.globals();
            let media = MediaDecoder;
            let bind = || -> rquickjs::Result<()> {
                globals.set(
                    "__playgateDecode",
                    Function::new(js.clone(), move |uri: String| decode_media(media, &uri))?,
                )?;
                globals.set(
                    "__playgatePhysics",
                    Function::new(js.clone(), |op: String, payload: String| {
                        physics_call(&op, &payload)
                    })?,
                )?;
                js.eval::<(), _>(PRELUDE)
            };
            bind().map_err(|e| self.fault(&js, e))
        });
        self.disarm();
        result.map_err(|fault| ModuleFault::new(format!("prelude failed: {}", fault)))
    }

    fn arm(&self, budget: Duration) {
        self.deadline.set(Some(Instant::now() + budget));
    }

    fn disarm(&self) {
        self.deadline.set(None);
    }

    fn expired(&self) -> bool {
        self.deadline
            .get()
            .is_some_and(|at| Instant::now() >= at)
    }

    /// Turn an interpreter error into a module fault, reading the pending
    /// exception when there is one.
    fn fault(&self, js: &Ctx<'_>, err: rquickjs::Error) -> ModuleFault {
        let thrown = matches!(err, rquickjs::Error::Exception).then(|| js.catch());
        if self.expired() {
            return ModuleFault::new("script exceeded its time budget");
        }
        let Some(thrown) = thrown else {
            return ModuleFault::new(err.to_string());
        };
        let message = thrown
            .as_exception()
            .and_then(|e| e.message())
            .or_else(|| thrown.as_string().and_then(|s| s.to_string().ok()))
            .unwrap_or_else(|| "uncaught exception".to_string());
        ModuleFault::new(message)
    }

    fn host_fn<'js>(js: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
        let host: Object = js.globals().get(HOST)?;
        host.get(name)
    }

    /// Run one entry and collect its outcome, draining promise jobs in
    /// between so async operations settle.
    fn run(&self, entry: Entry<'_>, budget: Duration) -> ModuleResult<Outcome> {
        self.arm(budget);
        let outcome = self.run_armed(entry);
        self.disarm();
        outcome
    }

    fn run_armed(&self, entry: Entry<'_>) -> ModuleResult<Outcome> {
        let now = self.now_ms.get();
        self.context.with(|js| {
            let started = match &entry {
                Entry::Game { operation, args } => Self::host_fn(&js, "call")
                    .and_then(|f| f.call::<_, ()>((*operation, args.to_string(), now))),
                Entry::Frame { dt_ms } => {
                    Self::host_fn(&js, "frame").and_then(|f| f.call::<_, ()>((*dt_ms, now)))
                }
                Entry::Timer { id } => {
                    Self::host_fn(&js, "timer").and_then(|f| f.call::<_, ()>((*id as f64, now)))
                }
            };
            started.map_err(|e| self.fault(&js, e))
        })?;

        self.drain_jobs()?;

        let raw = self.context.with(|js| {
            Self::host_fn(&js, "collect")
                .and_then(|f| f.call::<_, String>(()))
                .map_err(|e| self.fault(&js, e))
        })?;
        let outcome: Outcome = serde_json::from_str(&raw)
            .map_err(|e| ModuleFault::new(format!("malformed call outcome: {}", e)))?;
        if outcome.pending {
            return Err(ModuleFault::new("returned promise did not settle"));
        }
        Ok(outcome)
    }

    fn drain_jobs(&self) -> ModuleResult<()> {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(_) if self.expired() => {
                    return Err(ModuleFault::new("script exceeded its time budget"))
                }
                Err(_) => return Err(ModuleFault::new("a pending promise job failed")),
            }
        }
    }

    /// Run a game operation that may change the context.
    fn invoke(
        &mut self,
        ctx: &mut SandboxContext,
        operation: &str,
        args: Value,
        budget: Duration,
    ) -> ModuleResult<Value> {
        self.now_ms.set(ctx.clock().now_ms());
        let outcome = self.run(Entry::Game { operation, args }, budget)?;
        self.apply(ctx, outcome.effects);
        match outcome.error {
            Some(message) => Err(ModuleFault::new(message)),
            None => Ok(outcome.ok),
        }
    }

    /// Run a read-only operation. Effects produced while observing are
    /// dropped.
    fn observe(&self, operation: &str) -> ModuleResult<Value> {
        let outcome = self.run(
            Entry::Game {
                operation,
                args: json!([]),
            },
            self.limits.call_budget,
        )?;
        match outcome.error {
            Some(message) => Err(ModuleFault::new(message)),
            None => Ok(outcome.ok),
        }
    }

    fn apply(&mut self, ctx: &mut SandboxContext, effects: Effects) {
        let renderer = ctx.renderer3d();
        let surface = ctx.surface();
        for draw in effects.draw {
            match draw {
                Draw::Clear { color } => surface.clear(color),
                Draw::Rect { x, y, w, h, color } => surface.fill_rect(x, y, w, h, color),
                Draw::Circle { x, y, r, color } => surface.circle(x, y, r, color),
                Draw::Polygon { points, color } => surface.polygon(points, color),
                Draw::Text {
                    x,
                    y,
                    size,
                    text,
                    color,
                } => surface.text(x, y, size, text, color),
                Draw::Sprite { asset, x, y, w, h } => surface.sprite(asset, x, y, w, h),
                Draw::Mesh {
                    vertices,
                    triangles,
                    color,
                } => {
                    if let Some(renderer) = &renderer {
                        renderer.draw_mesh(surface, &vertices, &triangles, color);
                    }
                }
            }
        }
        surface.discard(effects.dropped);

        if effects.frame {
            ctx.frames().request_frame();
        }
        for (script_id, delay_ms) in effects.schedule {
            match ctx.timers().set_timeout(delay_ms) {
                Some(timer) => {
                    self.host_timers.insert(script_id, timer);
                    self.script_timers.insert(timer, script_id);
                }
                None => tracing::debug!(game_id = %self.game_id, "Timer dropped; too many pending"),
            }
        }
        for script_id in effects.cancel {
            if let Some(timer) = self.host_timers.remove(&script_id) {
                self.script_timers.remove(&timer);
                ctx.timers().clear_timeout(timer);
            }
        }
    }

    fn install(&self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        let assets: serde_json::Map<String, Value> = ctx
            .asset_paths()
            .map(|path| {
                let entry = match (ctx.asset(path), ctx.asset_error(path)) {
                    (Some(resource), _) => json!({ "ok": describe_resource(resource) }),
                    (None, Some(error)) => json!({ "error": error }),
                    (None, None) => json!({ "error": "not loaded" }),
                };
                (path.to_string(), entry)
            })
            .collect();
        let config = json!({
            "width": ctx.surface().width(),
            "height": ctx.surface().height(),
            "maxDraws": MAX_DRAW_COMMANDS,
            "maxTimers": MAX_TIMERS,
            "seed": ctx.random().range(1, i32::MAX as i64),
            "assets": assets,
            "renderer3d": ctx.renderer3d().is_some(),
            "physics2d": ctx.physics2d().is_some(),
        });

        self.context.with(|js| {
            Self::host_fn(&js, "install")
                .and_then(|f| f.call::<_, ()>((config.to_string(),)))
                .map_err(|e| self.fault(&js, e))
        })
    }

    fn evaluate_source(&self) -> ModuleResult<()> {
        self.arm(self.limits.bootstrap_budget);
        let result = self.context.with(|js| {
            js.eval::<(), _>(self.source.as_str())
                .map_err(|e| self.fault(&js, e))
        });
        self.disarm();
        result.map_err(|fault| ModuleFault::new(format!("module source failed: {}", fault)))?;
        self.drain_jobs()
    }
}

impl GameModule for ScriptModule {
    fn init(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.install(ctx)?;
        self.evaluate_source()?;
        self.invoke(ctx, "init", json!([]), self.limits.bootstrap_budget)
            .map(|_| ())
    }

    fn start(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        let budget = self.limits.call_budget;
        self.invoke(ctx, "start", json!([]), budget).map(|_| ())
    }

    fn reset(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.host_timers.clear();
        self.script_timers.clear();
        let budget = self.limits.call_budget;
        self.invoke(ctx, "reset", json!([]), budget).map(|_| ())
    }

    fn read_state(&self) -> ModuleResult<Value> {
        self.observe("readState")
    }

    fn dispatch_input(&mut self, ctx: &mut SandboxContext, action: Action) -> ModuleResult<bool> {
        let budget = self.limits.call_budget;
        match self.invoke(ctx, "dispatchInput", json!([action.token()]), budget)? {
            Value::Bool(accepted) => Ok(accepted),
            other => Err(ModuleFault::new(format!(
                "dispatchInput returned {} instead of a boolean",
                other
            ))),
        }
    }

    fn read_meta(&self) -> ModuleResult<Value> {
        self.observe("readMeta")
    }

    fn on_frame(&mut self, ctx: &mut SandboxContext, dt_ms: f64) -> ModuleResult<()> {
        self.now_ms.set(ctx.clock().now_ms());
        let outcome = self.run(Entry::Frame { dt_ms }, self.limits.call_budget)?;
        self.apply(ctx, outcome.effects);
        outcome.error.map_or(Ok(()), |e| Err(ModuleFault::new(e)))
    }

    fn on_timer(&mut self, ctx: &mut SandboxContext, timer: TimerId) -> ModuleResult<()> {
        let Some(id) = self.script_timers.remove(&timer) else {
            return Ok(());
        };
        self.host_timers.remove(&id);
        self.now_ms.set(ctx.clock().now_ms());
        let outcome = self.run(Entry::Timer { id }, self.limits.call_budget)?;
        self.apply(ctx, outcome.effects);
        outcome.error.map_or(Ok(()), |e| Err(ModuleFault::new(e)))
    }
}

// =============================================================================
// Native bindings
// =============================================================================

/// What a module learns about a decoded resource. Raw bytes stay on the
/// host; sprites refer to assets by path.
fn describe_resource(resource: &Resource) -> Value {
    match resource {
        Resource::Image {
            width,
            height,
            format,
            ..
        } => json!({ "category": "image", "width": width, "height": height, "format": format }),
        Resource::Audio { container, bytes } => {
            json!({ "category": "audio", "container": container, "bytes": bytes.len() })
        }
        Resource::Model { format, bytes } => {
            json!({ "category": "model", "format": format, "bytes": bytes.len() })
        }
        Resource::Font { format, bytes } => {
            json!({ "category": "font", "format": format, "bytes": bytes.len() })
        }
        Resource::Data(value) => json!({ "category": "data", "value": value }),
    }
}

fn decode_media(media: MediaDecoder, uri: &str) -> String {
    match media.decode_data_uri(uri) {
        Ok(resource) => json!({ "ok": describe_resource(&resource) }),
        Err(fault) => json!({ "error": fault.0 }),
    }
    .to_string()
}

#[derive(Deserialize)]
struct IntegrateArgs {
    body: Body,
    dt: f64,
}

#[derive(Deserialize)]
struct OverlapArgs {
    a: Body,
    b: Body,
}

#[derive(Deserialize)]
struct ClampArgs {
    body: Body,
    width: f64,
    height: f64,
}

fn physics_call(op: &str, payload: &str) -> String {
    let physics = Physics2d::default();
    let result: Result<Value, serde_json::Error> = match op {
        "integrate" => serde_json::from_str::<IntegrateArgs>(payload).map(|mut args| {
            physics.integrate(&mut args.body, args.dt);
            json!(args.body)
        }),
        "overlaps" => serde_json::from_str::<OverlapArgs>(payload)
            .map(|args| json!(Physics2d::overlaps(&args.a, &args.b))),
        "clamp" => serde_json::from_str::<ClampArgs>(payload).map(|mut args| {
            let floor = Physics2d::clamp_to(&mut args.body, args.width, args.height);
            json!({ "body": args.body, "floor": floor })
        }),
        other => return json!({ "error": format!("unknown physics operation '{}'", other) }).to_string(),
    };
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({ "error": format!("invalid body: {}", e) }),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use playgate_core::{Dimensionality, SharedCapability, Submission};

    fn limits() -> ScriptLimits {
        ScriptLimits {
            bootstrap_budget: Duration::from_millis(500),
            call_budget: Duration::from_millis(200),
            memory_bytes: 32 * 1024 * 1024,
        }
    }

    fn module(source: &str) -> ScriptModule {
        let record =
            ModuleRecord::from_submission(Submission::inline("agent", source, Dimensionality::TwoD));
        ScriptModule::new(&record, limits()).unwrap()
    }

    const COUNTER: &str = r#"
      let score = 0;
      window.GAME = {
        async init() { surface.clear([0, 0, 0]); },
        start() { surface.fillRect(1, 2, 3, 4, [255, 0, 0, 255]); },
        reset() { score = 0; },
        readState() { return { score, ended: score >= 3 }; },
        dispatchInput(action) {
          if (action !== 'up') return false;
          score += 1;
          return true;
        },
        readMeta() { return { name: 'Counter', description: 'Press up', controls: { up: 'count' } }; }
      };
    "#;

    #[test]
    fn test_runs_submitted_operations() {
        let mut ctx = test_context(&[]);
        let mut game = module(COUNTER);
        game.init(&mut ctx).unwrap();
        game.start(&mut ctx).unwrap();
        assert_eq!(ctx.surface().commands().len(), 2);

        assert!(game.dispatch_input(&mut ctx, Action::Up).unwrap());
        assert!(!game.dispatch_input(&mut ctx, Action::Down).unwrap());
        assert_eq!(game.read_state().unwrap(), json!({ "score": 1, "ended": false }));
        assert_eq!(game.read_meta().unwrap()["name"], "Counter");

        game.reset(&mut ctx).unwrap();
        assert_eq!(game.read_state().unwrap()["score"], 0);
    }

    #[test]
    fn test_exceptions_become_faults() {
        let mut ctx = test_context(&[]);
        let mut game = module(
            r#"window.GAME = {
              init() {}, start() { throw new Error('boom'); }, reset() {},
              readState() { return null.x; }, dispatchInput() { return 'yes'; },
              readMeta() { return {}; }
            };"#,
        );
        game.init(&mut ctx).unwrap();
        assert_eq!(game.start(&mut ctx).unwrap_err().0, "boom");
        assert!(game.read_state().is_err());
        assert!(game.dispatch_input(&mut ctx, Action::Up).is_err());
    }

    #[test]
    fn test_bootstrap_failures() {
        let mut ctx = test_context(&[]);
        let mut missing = module("const x = 1;");
        assert!(missing.init(&mut ctx).unwrap_err().0.contains("window.GAME"));

        let mut syntax = module("window.GAME = {");
        assert!(syntax.init(&mut ctx).unwrap_err().0.starts_with("module source failed"));

        let mut rejected = module(
            "window.GAME = { async init() { throw new Error('no assets'); } };",
        );
        assert_eq!(rejected.init(&mut ctx).unwrap_err().0, "no assets");
    }

    #[test]
    fn test_runaway_script_is_interrupted() {
        let mut ctx = test_context(&[]);
        let mut game = module(
            r#"window.GAME = {
              init() {}, start() { for (;;) {} }, reset() {},
              readState() { return { score: 0, ended: false }; },
              dispatchInput() { return false; }, readMeta() { return {}; }
            };"#,
        );
        game.init(&mut ctx).unwrap();
        let err = game.start(&mut ctx).unwrap_err();
        assert_eq!(err.0, "script exceeded its time budget");
        // The interpreter stays usable after an interrupt.
        assert_eq!(game.read_state().unwrap()["score"], 0);
    }

    #[test]
    fn test_only_allowlisted_globals_exist() {
        let mut ctx = test_context(&[]);
        let mut game = module(
            r#"window.GAME = {
              init() {}, start() {}, reset() {}, dispatchInput() { return false; },
              readMeta() { return {}; },
              readState() {
                const names = ['localStorage', 'fetch', 'XMLHttpRequest', 'WebSocket',
                  'document', 'navigator', 'postMessage', 'require', 'std', 'os',
                  'renderer3d', 'physics2d'];
                const present = names.filter((n) => typeof globalThis[n] !== 'undefined');
                const bound = ['surface', 'requestAnimationFrame', 'setTimeout', 'performance',
                  'decodeMedia', 'assets'].every((n) => typeof globalThis[n] !== 'undefined');
                return { score: 0, ended: false, present, bound };
              }
            };"#,
        );
        game.init(&mut ctx).unwrap();
        let state = game.read_state().unwrap();
        assert_eq!(state["present"], json!([]));
        assert_eq!(state["bound"], true);
    }

    #[test]
    fn test_timers_and_frames_reach_the_context() {
        let mut ctx = test_context(&[SharedCapability::Physics2d]);
        let mut game = module(
            r#"let fired = 0, frames = 0, body = { x: 0, y: 0, vx: 0, vy: 0, w: 1, h: 1 };
            window.GAME = {
              init() {}, reset() {}, dispatchInput() { return false; }, readMeta() { return {}; },
              start() {
                setTimeout(() => { fired += 1; }, 10);
                const cancelled = setTimeout(() => { fired += 100; }, 10);
                clearTimeout(cancelled);
                requestAnimationFrame((t) => { frames += 1; physics2d.integrate(body, 16); });
              },
              readState() { return { score: fired, ended: false, frames, falling: body.vy > 0 }; }
            };"#,
        );
        game.init(&mut ctx).unwrap();
        game.start(&mut ctx).unwrap();
        assert_eq!(ctx.timers().pending(), 1);

        for timer in ctx.advance_clock(16.0) {
            game.on_timer(&mut ctx, timer).unwrap();
        }
        assert!(ctx.begin_frame());
        game.on_frame(&mut ctx, 16.0).unwrap();

        let state = game.read_state().unwrap();
        assert_eq!(state["score"], 1);
        assert_eq!(state["frames"], 1);
        assert_eq!(state["falling"], true);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let source = r#"let rolls = [];
            window.GAME = {
              init() { for (let i = 0; i < 4; i++) rolls.push(Math.random()); },
              start() {}, reset() {}, dispatchInput() { return false; }, readMeta() { return {}; },
              readState() { return { score: 0, ended: false, rolls }; }
            };"#;
        let mut first = module(source);
        let mut second = module(source);
        first.init(&mut test_context(&[])).unwrap();
        second.init(&mut test_context(&[])).unwrap();
        assert_eq!(
            first.read_state().unwrap()["rolls"],
            second.read_state().unwrap()["rolls"]
        );
    }
}
