//! The contract every game module implements.

use serde_json::Value;
use thiserror::Error;

use playgate_core::Action;

use crate::context::{SandboxContext, TimerId};

/// An exception raised by module code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ModuleFault(pub String);

impl ModuleFault {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ModuleResult<T> = std::result::Result<T, ModuleFault>;

/// A loaded game module.
///
/// One value of this trait is one game: instances never share a module
/// object. All methods run on the instance thread. Results of `read_state`
/// and `read_meta` are raw values; the bridge checks their shape.
///
/// `read_state` and `read_meta` take `&self`, so observing the game cannot
/// change it.
pub trait GameModule {
    /// Prepare the game. Runs once, during bootstrap.
    fn init(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()>;

    /// Begin (or resume) play.
    fn start(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()>;

    /// Return to the initial state.
    fn reset(&mut self, ctx: &mut SandboxContext) -> ModuleResult<()>;

    /// Current `{score, ended, ...}`.
    fn read_state(&self) -> ModuleResult<Value>;

    /// Apply one action; `Ok(false)` if the game did not accept it.
    fn dispatch_input(&mut self, ctx: &mut SandboxContext, action: Action) -> ModuleResult<bool>;

    /// `{name, description, controls, ...}`. Must not change over the
    /// lifetime of the instance.
    fn read_meta(&self) -> ModuleResult<Value>;

    /// A requested frame arrived. `dt_ms` is the game time since the
    /// previous frame.
    fn on_frame(&mut self, _ctx: &mut SandboxContext, _dt_ms: f64) -> ModuleResult<()> {
        Ok(())
    }

    /// A timer set through the context fired.
    fn on_timer(&mut self, _ctx: &mut SandboxContext, _timer: TimerId) -> ModuleResult<()> {
        Ok(())
    }
}
