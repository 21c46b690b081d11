#![deny(unused)]
//! Governance for Playgate.
//!
//! This crate provides:
//! - Per-agent rate limiting (fixed windows)
//! - Distributed tracing setup
//! - Prometheus metrics helpers

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;

pub use metrics::{
    setup_metrics_recorder, track_bridge_call, track_live_instances, track_rate_limited,
    track_request, track_runtime_fault, track_session, track_validation,
};
pub use rate_limit::FixedWindowRateLimiter;
pub use tracing_layer::configure_tracing;
