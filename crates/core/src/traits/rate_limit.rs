//! Per-agent rate limiter trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::LimitKind;

/// Per-agent quota counters, one independent counter per [`LimitKind`].
///
/// Implementations must increment atomically so concurrent callers
/// cannot overshoot a limit.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of `kind` for `agent_id`.
    ///
    /// Returns [`crate::Error::RateLimited`] with the window reset time when
    /// the quota is exhausted. A denied call consumes nothing.
    async fn check_and_increment(&self, agent_id: &str, kind: LimitKind) -> Result<()> {
        self.check_and_increment_all(agent_id, &[kind]).await
    }

    /// Consume one unit of every kind in `kinds`, or none of them.
    ///
    /// Kinds are checked in order; the error names the first one that is
    /// exhausted, and counters already taken for the request are given back.
    async fn check_and_increment_all(&self, agent_id: &str, kinds: &[LimitKind]) -> Result<()>;

    /// Remaining quota in the current window.
    async fn remaining(&self, agent_id: &str, kind: LimitKind) -> Result<u32>;

    /// Reset a counter (for admin/testing).
    async fn reset(&self, agent_id: &str, kind: LimitKind) -> Result<()>;
}
