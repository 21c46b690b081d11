//! In-memory module store and score ledger using DashMap.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use playgate_core::{
    traits::{ModuleStore, ScoreSink},
    types::{ModuleRecord, ModuleSummary, Settlement},
    Error, Result,
};

/// In-memory module store.
///
/// Suitable for development and tests; records are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryModuleStore {
    modules: DashMap<String, ModuleRecord>,
}

impl InMemoryModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[async_trait]
impl ModuleStore for InMemoryModuleStore {
    async fn save(&self, record: &ModuleRecord) -> Result<()> {
        self.modules.insert(record.id.clone(), record.clone());
        tracing::debug!(game_id = %record.id, total = self.modules.len(), "Module stored");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<ModuleRecord>> {
        Ok(self.modules.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self, limit: usize) -> Result<Vec<ModuleSummary>> {
        let mut summaries: Vec<ModuleSummary> =
            self.modules.iter().map(|r| r.value().summary()).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.modules.remove(id).is_some())
    }
}

/// In-memory score ledger. One settlement per session id.
#[derive(Debug, Default)]
pub struct InMemoryScoreLedger {
    settlements: DashMap<String, Settlement>,
}

impl InMemoryScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<Settlement> {
        self.settlements.get(session_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    /// Highest settled scores for a game, best first.
    pub fn leaderboard(&self, game_id: &str, limit: usize) -> Vec<Settlement> {
        let mut rows: Vec<Settlement> = self
            .settlements
            .iter()
            .filter(|s| s.game_id == game_id)
            .map(|s| s.value().clone())
            .collect();
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        rows.truncate(limit);
        rows
    }
}

#[async_trait]
impl ScoreSink for InMemoryScoreLedger {
    async fn settle(&self, settlement: &Settlement) -> Result<()> {
        match self.settlements.entry(settlement.session_id.clone()) {
            Entry::Occupied(_) => Err(Error::invalid_request(format!(
                "session {} is already settled",
                settlement.session_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(settlement.clone());
                tracing::info!(
                    session_id = %settlement.session_id,
                    game_id = %settlement.game_id,
                    score = settlement.score,
                    "Score settled"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use playgate_core::types::{Dimensionality, EndReason, Submission};

    fn settlement(session_id: &str, score: f64) -> Settlement {
        Settlement {
            session_id: session_id.into(),
            agent_id: "agent".into(),
            game_id: "g".into(),
            score,
            reason: EndReason::AgentEnded,
            settled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_module_store_roundtrip() {
        let store = InMemoryModuleStore::new();
        let record =
            ModuleRecord::from_submission(Submission::inline("a", "src", Dimensionality::TwoD));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.digest, record.digest);
        assert_eq!(store.list(10).await.unwrap().len(), 1);
        assert!(store.delete(&record.id).await.unwrap());
        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_settles_once() {
        let ledger = InMemoryScoreLedger::new();
        ledger.settle(&settlement("s-1", 10.0)).await.unwrap();
        assert!(ledger.settle(&settlement("s-1", 99.0)).await.is_err());
        assert_eq!(ledger.get("s-1").unwrap().score, 10.0);
    }

    #[tokio::test]
    async fn test_leaderboard_order() {
        let ledger = InMemoryScoreLedger::new();
        for (id, score) in [("a", 3.0), ("b", 9.0), ("c", 5.0)] {
            ledger.settle(&settlement(id, score)).await.unwrap();
        }
        let top: Vec<f64> = ledger.leaderboard("g", 2).iter().map(|s| s.score).collect();
        assert_eq!(top, vec![9.0, 5.0]);
    }
}
