#![deny(unused)]
//! Session management for Playgate.
//!
//! A session binds one agent to one isolated instance of a stored module.
//! Every call is owner-checked, rate limited and serialized per session;
//! ending a session (by the agent or by the idle reaper) settles the last
//! observed score exactly once.

pub mod manager;

pub use manager::{SessionManager, SessionStart};
