//! Scriptable module for exercising fault paths.

use serde_json::{json, Value};
use std::cell::Cell;
use std::time::Duration;

use playgate_core::{Action, Operation};

use crate::context::SandboxContext;
use crate::module::{GameModule, ModuleFault, ModuleResult};

/// A trivial game with injectable faults.
///
/// Every accepted input scores one point. By default it accepts every
/// action except `pause` and never ends.
#[derive(Debug, Default)]
pub struct MockModule {
    panic_on: Option<Operation>,
    fail_on: Option<Operation>,
    hang_on: Option<(Operation, Duration)>,
    bad_state: bool,
    drifting_meta: bool,
    end_after: Option<u32>,
    score: f64,
    inputs: u32,
    meta_reads: Cell<u32>,
}

impl MockModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panic inside `operation`.
    pub fn panic_on(mut self, operation: Operation) -> Self {
        self.panic_on = Some(operation);
        self
    }

    /// Return a module fault from `operation`.
    pub fn fail_on(mut self, operation: Operation) -> Self {
        self.fail_on = Some(operation);
        self
    }

    /// Block the instance thread for `duration` inside `operation`.
    pub fn hang_on(mut self, operation: Operation, duration: Duration) -> Self {
        self.hang_on = Some((operation, duration));
        self
    }

    /// `readState` returns a value without a score.
    pub fn with_bad_state(mut self) -> Self {
        self.bad_state = true;
        self
    }

    /// `readMeta` returns a different name on every read.
    pub fn with_drifting_meta(mut self) -> Self {
        self.drifting_meta = true;
        self
    }

    /// Report `ended` after this many accepted inputs.
    pub fn end_after(mut self, inputs: u32) -> Self {
        self.end_after = Some(inputs);
        self
    }

    fn trip(&self, operation: Operation) -> ModuleResult<()> {
        if let Some((op, duration)) = self.hang_on {
            if op == operation {
                std::thread::sleep(duration);
            }
        }
        if self.panic_on == Some(operation) {
            panic!("injected panic in {}", operation);
        }
        if self.fail_on == Some(operation) {
            return Err(ModuleFault::new(format!("injected fault in {}", operation)));
        }
        Ok(())
    }

    fn ended(&self) -> bool {
        self.end_after.is_some_and(|n| self.inputs >= n)
    }
}

impl GameModule for MockModule {
    fn init(&mut self, _ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.trip(Operation::Init)
    }

    fn start(&mut self, _ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.trip(Operation::Start)
    }

    fn reset(&mut self, _ctx: &mut SandboxContext) -> ModuleResult<()> {
        self.trip(Operation::Reset)?;
        self.score = 0.0;
        self.inputs = 0;
        Ok(())
    }

    fn read_state(&self) -> ModuleResult<Value> {
        self.trip(Operation::ReadState)?;
        if self.bad_state {
            return Ok(json!({ "ended": false }));
        }
        Ok(json!({
            "score": self.score,
            "ended": self.ended(),
            "inputs": self.inputs,
        }))
    }

    fn dispatch_input(&mut self, ctx: &mut SandboxContext, action: Action) -> ModuleResult<bool> {
        self.trip(Operation::DispatchInput)?;
        if action == Action::Pause || self.ended() {
            return Ok(false);
        }
        self.inputs += 1;
        self.score += 1.0;
        ctx.frames().request_frame();
        Ok(true)
    }

    fn read_meta(&self) -> ModuleResult<Value> {
        self.trip(Operation::ReadMeta)?;
        let reads = self.meta_reads.get();
        self.meta_reads.set(reads + 1);
        let name = if self.drifting_meta {
            format!("Mock {}", reads)
        } else {
            "Mock".to_string()
        };
        Ok(json!({
            "name": name,
            "description": "Scriptable test module",
            "controls": ["up", "down", "left", "right", "action", "secondary"],
        }))
    }

    fn on_frame(&mut self, ctx: &mut SandboxContext, _dt_ms: f64) -> ModuleResult<()> {
        let score = self.score;
        let surface = ctx.surface();
        surface.clear([0, 0, 0, 255]);
        surface.text(0.0, 0.0, 12.0, format!("{}", score), [255; 4]);
        Ok(())
    }
}
