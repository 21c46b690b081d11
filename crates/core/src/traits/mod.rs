//! Core traits for Playgate.
//!
//! These are the seams to external collaborators:
//! - `store`: persistence of accepted modules (`ModuleStore`)
//! - `settlement`: the score ledger reached at session end (`ScoreSink`)
//! - `rate_limit`: per-agent quota counters (`RateLimiter`)

pub mod rate_limit;
pub mod settlement;
pub mod store;

pub use rate_limit::*;
pub use settlement::*;
pub use store::*;
