use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::limits::{AssetCategory, BundleTier, Dimensionality, SourceMode};

// =============================================================================
// Submission Types
// =============================================================================

/// Shared capability a module may request at submission time.
///
/// Requests are additive on top of the baseline allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedCapability {
    /// Shared 3D rendering library.
    Renderer3d,
    /// Shared 2D physics helper.
    Physics2d,
}

impl SharedCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Renderer3d => "renderer3d",
            Self::Physics2d => "physics2d",
        }
    }
}

impl fmt::Display for SharedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharedCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "renderer3d" | "renderer_3d" | "three" => Ok(Self::Renderer3d),
            "physics2d" | "physics_2d" => Ok(Self::Physics2d),
            other => Err(format!("unknown shared capability '{}'", other)),
        }
    }
}

/// Descriptive metadata attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub title: String,
    pub description: String,
    pub genre: String,
}

/// One declared resource in a bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path of the resource inside the bundle.
    pub path: String,
    /// Resource category (decides the size ceiling and decoder).
    pub category: AssetCategory,
    /// Declared size in bytes.
    pub size: u64,
}

/// Declared resource inventory for packaged submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub entries: Vec<ManifestEntry>,
}

impl BundleManifest {
    /// Sum of all declared entry sizes.
    pub fn aggregate_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Find an entry by path.
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}

/// Manifest plus the resource bytes of a packaged bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundlePayload {
    pub manifest: BundleManifest,
    pub files: BTreeMap<String, Bytes>,
}

impl BundlePayload {
    pub fn new(manifest: BundleManifest) -> Self {
        Self {
            manifest,
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.insert(path.into(), data.into());
        self
    }
}

/// One candidate module plus metadata, as received from an agent.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Identity of the submitting agent.
    pub agent_id: String,
    pub metadata: SubmissionMetadata,
    /// Raw module text. Never executed during validation.
    pub source: String,
    pub mode: SourceMode,
    pub dimensionality: Dimensionality,
    /// Size tier (packaged bundles only).
    pub tier: Option<BundleTier>,
    pub shared_capabilities: BTreeSet<SharedCapability>,
    pub thumbnail: Option<Bytes>,
    pub bundle: Option<BundlePayload>,
}

impl Submission {
    /// Create an inline-script submission with empty metadata.
    pub fn inline(
        agent_id: impl Into<String>,
        source: impl Into<String>,
        dimensionality: Dimensionality,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            metadata: SubmissionMetadata::default(),
            source: source.into(),
            mode: SourceMode::InlineScript,
            dimensionality,
            tier: None,
            shared_capabilities: BTreeSet::new(),
            thumbnail: None,
            bundle: None,
        }
    }

    pub fn with_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_metadata(mut self, metadata: SubmissionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<Bytes>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_bundle(mut self, tier: BundleTier, bundle: BundlePayload) -> Self {
        self.mode = SourceMode::PackagedBundle;
        self.tier = Some(tier);
        self.bundle = Some(bundle);
        self
    }

    pub fn with_shared_capability(mut self, capability: SharedCapability) -> Self {
        self.shared_capabilities.insert(capability);
        self
    }

    /// Raw byte length of the source.
    pub fn source_len(&self) -> u64 {
        self.source.len() as u64
    }
}
