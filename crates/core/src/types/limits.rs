use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Size Ceiling Tables
// =============================================================================
//
// These tables are shared read-only by the validator and the asset loader.

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// How a submission packages its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// A single script body.
    InlineScript,
    /// A complete standalone document embedding the script.
    FullDocument,
    /// An entry script plus a bundle of resources described by a manifest.
    PackagedBundle,
}

impl SourceMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlineScript => "inline-script",
            Self::FullDocument => "full-document",
            Self::PackagedBundle => "packaged-bundle",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline-script" | "inline" | "script" => Ok(Self::InlineScript),
            "full-document" | "document" | "html" => Ok(Self::FullDocument),
            "packaged-bundle" | "bundle" => Ok(Self::PackagedBundle),
            other => Err(format!("unknown submission mode '{}'", other)),
        }
    }
}

/// Declared dimensionality of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimensionality {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

impl Dimensionality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
        }
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimensionality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2d" => Ok(Self::TwoD),
            "3d" => Ok(Self::ThreeD),
            other => Err(format!("unknown dimensionality '{}'", other)),
        }
    }
}

/// Ceiling for the raw source text of a submission.
///
/// Packaged bundles check their entry script against the full-document
/// ceiling; the bundle's resources are bounded by its [`BundleTier`].
pub const fn source_ceiling(mode: SourceMode, dimensionality: Dimensionality) -> u64 {
    match (mode, dimensionality) {
        (SourceMode::InlineScript, Dimensionality::TwoD) => 50 * KIB,
        (SourceMode::InlineScript, Dimensionality::ThreeD) => 100 * KIB,
        (SourceMode::FullDocument, Dimensionality::TwoD)
        | (SourceMode::PackagedBundle, Dimensionality::TwoD) => 500 * KIB,
        (SourceMode::FullDocument, Dimensionality::ThreeD)
        | (SourceMode::PackagedBundle, Dimensionality::ThreeD) => MIB,
    }
}

/// Resource category inside a packaged bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Image,
    Audio,
    /// 3D geometry (glTF / GLB).
    Model,
    Font,
    /// Structured data (JSON).
    Data,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 5] = [
        Self::Image,
        Self::Audio,
        Self::Model,
        Self::Font,
        Self::Data,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Model => "model",
            Self::Font => "font",
            Self::Data => "data",
        }
    }

    /// Infer a category from a file extension.
    pub fn from_extension(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => Some(Self::Image),
            "wav" | "ogg" | "mp3" | "flac" => Some(Self::Audio),
            "gltf" | "glb" => Some(Self::Model),
            "ttf" | "otf" | "woff" | "woff2" => Some(Self::Font),
            "json" => Some(Self::Data),
            _ => None,
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown asset category '{}'", s))
    }
}

/// Named size bucket for packaged bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleTier {
    Small,
    Medium,
    Large,
    Xlarge,
}

impl BundleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Xlarge => "xlarge",
        }
    }

    /// Ceiling for the sum of all bundle resources.
    pub const fn aggregate_ceiling(self) -> u64 {
        match self {
            Self::Small => 5 * MIB,
            Self::Medium => 20 * MIB,
            Self::Large => 50 * MIB,
            Self::Xlarge => 100 * MIB,
        }
    }

    /// Ceiling for a single resource of the given category.
    pub const fn category_ceiling(self, category: AssetCategory) -> u64 {
        use AssetCategory::*;
        match (self, category) {
            (Self::Small, Image) => MIB,
            (Self::Small, Audio) => 2 * MIB,
            (Self::Small, Model) => 2 * MIB,
            (Self::Small, Font) => 512 * KIB,
            (Self::Small, Data) => 256 * KIB,

            (Self::Medium, Image) => 4 * MIB,
            (Self::Medium, Audio) => 8 * MIB,
            (Self::Medium, Model) => 8 * MIB,
            (Self::Medium, Font) => MIB,
            (Self::Medium, Data) => MIB,

            (Self::Large, Image) => 8 * MIB,
            (Self::Large, Audio) => 16 * MIB,
            (Self::Large, Model) => 24 * MIB,
            (Self::Large, Font) => 2 * MIB,
            (Self::Large, Data) => 4 * MIB,

            (Self::Xlarge, Image) => 16 * MIB,
            (Self::Xlarge, Audio) => 32 * MIB,
            (Self::Xlarge, Model) => 48 * MIB,
            (Self::Xlarge, Font) => 4 * MIB,
            (Self::Xlarge, Data) => 8 * MIB,
        }
    }
}

impl Default for BundleTier {
    fn default() -> Self {
        Self::Small
    }
}

impl fmt::Display for BundleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::Xlarge),
            other => Err(format!("unknown bundle tier '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_2d_ceiling() {
        assert_eq!(
            source_ceiling(SourceMode::InlineScript, Dimensionality::TwoD),
            51_200
        );
    }

    #[test]
    fn test_category_ceilings_fit_aggregate() {
        for tier in [
            BundleTier::Small,
            BundleTier::Medium,
            BundleTier::Large,
            BundleTier::Xlarge,
        ] {
            for category in AssetCategory::ALL {
                assert!(tier.category_ceiling(category) <= tier.aggregate_ceiling());
            }
        }
    }

    #[test]
    fn test_parse_wire_names() {
        assert_eq!("inline-script".parse::<SourceMode>().unwrap(), SourceMode::InlineScript);
        assert_eq!("3D".parse::<Dimensionality>().unwrap(), Dimensionality::ThreeD);
        assert_eq!("xlarge".parse::<BundleTier>().unwrap(), BundleTier::Xlarge);
        assert!("huge".parse::<BundleTier>().is_err());
        assert_eq!(AssetCategory::from_extension("sfx/jump.OGG"), Some(AssetCategory::Audio));
        assert_eq!(AssetCategory::from_extension("README"), None);
    }
}
