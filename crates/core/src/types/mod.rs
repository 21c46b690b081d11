//! Core type definitions for Playgate.
//!
//! Broken down into submodules by concern.

pub mod bridge;
pub mod limits;
pub mod module;
pub mod rate_limit;
pub mod session;
pub mod submission;
pub mod validation;

pub use bridge::*;
pub use limits::*;
pub use module::*;
pub use rate_limit::*;
pub use session::*;
pub use submission::*;
pub use validation::*;
