//! Per-agent fixed-window rate limiter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use playgate_core::{
    config::RateLimitConfig, traits::RateLimiter, types::LimitKind, Error, Result,
};

use crate::metrics::track_rate_limited;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Counter for one `(limit kind, agent)` pair.
#[derive(Debug, Clone)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

impl Window {
    fn reset_at(&self, kind: LimitKind) -> DateTime<Utc> {
        self.started + chrono::Duration::from_std(kind.window()).unwrap_or_default()
    }
}

/// Fixed-window counters kept in memory.
///
/// Each `(kind, agent)` pair has its own window that starts at the first
/// counted request and resets once its length has elapsed. Counters are
/// updated under the map's entry lock, so concurrent requests cannot push a
/// counter past its limit.
pub struct FixedWindowRateLimiter {
    limits: RateLimitConfig,
    windows: DashMap<(LimitKind, String), Window>,
    clock: Clock,
}

impl FixedWindowRateLimiter {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            windows: DashMap::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source (tests).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn limit_for(&self, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::SubmissionsPerDay => self.limits.submissions_per_day,
            LimitKind::CallsPerHour => self.limits.calls_per_hour,
            LimitKind::SessionsPerHour => self.limits.sessions_per_hour,
        }
    }

    /// Drop windows that have already expired.
    pub fn cleanup(&self) {
        let now = (self.clock)();
        self.windows
            .retain(|(kind, _), window| window.reset_at(*kind) > now);
    }

    /// Number of live counters.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Take one unit of `kind` under the entry lock. Returns the start of
    /// the window the unit was taken from.
    fn take(&self, agent_id: &str, kind: LimitKind, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let limit = self.limit_for(kind);

        let mut window = self
            .windows
            .entry((kind, agent_id.to_string()))
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        if now >= window.reset_at(kind) {
            window.started = now;
            window.count = 0;
        }

        if window.count >= limit {
            let reset_at = window.reset_at(kind);
            tracing::warn!(
                agent_id = agent_id,
                limit = %kind,
                reset_at = %reset_at,
                "Rate limit exceeded"
            );
            track_rate_limited(kind.as_str());
            return Err(Error::RateLimited {
                limit: kind,
                reset_at,
            });
        }

        window.count += 1;
        tracing::debug!(
            agent_id = agent_id,
            limit = %kind,
            used = window.count,
            "Rate limit counter incremented"
        );
        Ok(window.started)
    }

    /// Return a unit taken by [`Self::take`], unless its window has rolled.
    fn give_back(&self, agent_id: &str, kind: LimitKind, started: DateTime<Utc>) {
        if let Some(mut window) = self.windows.get_mut(&(kind, agent_id.to_string())) {
            if window.started == started {
                window.count = window.count.saturating_sub(1);
            }
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check_and_increment_all(&self, agent_id: &str, kinds: &[LimitKind]) -> Result<()> {
        let now = (self.clock)();
        let mut taken = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            match self.take(agent_id, kind, now) {
                Ok(started) => taken.push((kind, started)),
                Err(e) => {
                    for (kind, started) in taken {
                        self.give_back(agent_id, kind, started);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn remaining(&self, agent_id: &str, kind: LimitKind) -> Result<u32> {
        let now = (self.clock)();
        let limit = self.limit_for(kind);
        let used = self
            .windows
            .get(&(kind, agent_id.to_string()))
            .filter(|w| now < w.reset_at(kind))
            .map(|w| w.count)
            .unwrap_or(0);
        Ok(limit.saturating_sub(used))
    }

    async fn reset(&self, agent_id: &str, kind: LimitKind) -> Result<()> {
        self.windows.remove(&(kind, agent_id.to_string()));
        Ok(())
    }
}
