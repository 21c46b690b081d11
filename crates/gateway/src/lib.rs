#![deny(unused)]
//! HTTP gateway for Playgate.
//!
//! This crate provides the HTTP entry points: module submission, agent
//! sessions, and realtime instances for a rendered UI.

pub mod error;
pub mod intake;
pub mod server;

pub use error::{AgentId, ApiError, ErrorResponse, AGENT_HEADER};
pub use intake::{read_submission, SubmissionService};
pub use server::{AppState, GatewayConfig, GatewayServer};
