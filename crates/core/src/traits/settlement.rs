//! Score settlement trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Settlement;

/// Receiver of final session scores (leaderboard / ledger).
///
/// The session manager calls `settle` exactly once per ended session.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    async fn settle(&self, settlement: &Settlement) -> Result<()>;
}
