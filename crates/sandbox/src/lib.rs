#![deny(unused)]
//! Isolation boundary for Playgate game modules.
//!
//! Every accepted module runs inside its own isolated instance. The host
//! reaches it only through the six-operation bridge; the module reaches
//! only the services in its [`SandboxContext`]. Submitted source runs on
//! [`ScriptRuntime`]; [`NativeRuntime`] hosts Rust modules for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Session manager / gateway             │
//! │    ↓ typed calls                       │
//! ├────────────────────────────────────────┤
//! │  SandboxHost → IsolatedInstance        │
//! │    ↓ BridgeClient (correlation ids)    │
//! ├────────────────────────────────────────┤
//! │  Instance thread                       │
//! │    GameModule + SandboxContext         │
//! │    surface, frames, clock, random,     │
//! │    timers, media, shared libraries     │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use playgate_sandbox::{InstanceOptions, SandboxHost, ScriptRuntime};
//!
//! let runtime = ScriptRuntime::from_config(&config.sandbox);
//! let host = SandboxHost::new(Arc::new(runtime), config.sandbox.clone());
//!
//! let instance = host.instantiate(&record, InstanceOptions::stepped(host.config())).await?;
//! instance.start().await?;
//! let accepted = instance.dispatch_input("right").await?;
//! ```

pub mod bridge;
pub mod capability;
pub mod context;
pub mod demo;
pub mod engine;
pub mod host;
pub mod instance;
pub mod mocks;
pub mod module;
pub mod script;
pub mod shared;

pub use bridge::BridgeClient;
pub use capability::{Capability, CapabilitySet, BASELINE};
pub use context::{
    AssetTable, Clock, Color, DisplayList, DrawCommand, FrameScheduler, MediaDecoder, Random,
    SandboxContext, Surface, TimerId, Timers,
};
pub use demo::DemoGame;
pub use engine::{ModuleFactory, ModuleRuntime, NativeRuntime};
pub use host::SandboxHost;
pub use instance::{FaultRecord, InstanceMode, InstanceOptions, InstancePhase, IsolatedInstance};
pub use mocks::MockModule;
pub use module::{GameModule, ModuleFault, ModuleResult};
pub use script::{ScriptLimits, ScriptModule, ScriptRuntime};
pub use shared::{Body, Physics2d, Renderer3d};
