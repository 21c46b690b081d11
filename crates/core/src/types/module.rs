use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use super::limits::{BundleTier, Dimensionality, SourceMode};
use super::submission::{BundlePayload, SharedCapability, Submission, SubmissionMetadata};

// =============================================================================
// Accepted Module Records
// =============================================================================

/// A submission that passed validation and was promoted to a module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Unique module (game) ID.
    pub id: String,
    /// Agent that submitted the module.
    pub agent_id: String,
    pub metadata: SubmissionMetadata,
    pub mode: SourceMode,
    pub dimensionality: Dimensionality,
    pub tier: Option<BundleTier>,
    pub shared_capabilities: BTreeSet<SharedCapability>,
    pub source: String,
    pub bundle: Option<BundlePayload>,
    pub thumbnail: Option<Bytes>,
    /// Hex SHA-256 of the source text.
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl ModuleRecord {
    /// Promote an accepted submission.
    pub fn from_submission(submission: Submission) -> Self {
        let digest = hex::encode(Sha256::digest(submission.source.as_bytes()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: submission.agent_id,
            metadata: submission.metadata,
            mode: submission.mode,
            dimensionality: submission.dimensionality,
            tier: submission.tier,
            shared_capabilities: submission.shared_capabilities,
            source: submission.source,
            bundle: submission.bundle,
            thumbnail: submission.thumbnail,
            digest,
            created_at: Utc::now(),
        }
    }

    /// Use a fixed ID (for registries keyed by well-known names).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            title: self.metadata.title.clone(),
            description: self.metadata.description.clone(),
            genre: self.metadata.genre.clone(),
            mode: self.mode,
            dimensionality: self.dimensionality,
            tier: self.tier,
            shared_capabilities: self.shared_capabilities.iter().copied().collect(),
            source_bytes: self.source.len() as u64,
            asset_count: self
                .bundle
                .as_ref()
                .map(|b| b.manifest.entries.len())
                .unwrap_or(0),
            digest: self.digest.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public view of a module record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub mode: SourceMode,
    pub dimensionality: Dimensionality,
    pub tier: Option<BundleTier>,
    pub shared_capabilities: Vec<SharedCapability>,
    pub source_bytes: u64,
    pub asset_count: usize,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_submission_digest_is_stable() {
        let a = ModuleRecord::from_submission(Submission::inline("a", "src", Dimensionality::TwoD));
        let b = ModuleRecord::from_submission(Submission::inline("b", "src", Dimensionality::TwoD));
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.id, b.id);
        assert_eq!(a.summary().source_bytes, 3);
    }
}
