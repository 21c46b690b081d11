use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

use super::limits::AssetCategory;

// =============================================================================
// Validation Types
// =============================================================================

/// One violated rule found while scanning a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The module never assigns its operations onto the anchor binding.
    MissingAnchor,
    /// A contract operation is not detectable in any accepted spelling.
    MissingOperation(String),
    /// A disallowed capability string occurs in the source.
    ForbiddenCapability(String),
    /// Raw source exceeds the ceiling for its mode and dimensionality.
    SizeExceeded { actual: u64, limit: u64 },
    /// The thumbnail is absent, undecodable or out of bounds.
    InvalidThumbnail(String),
    /// The bundle manifest is missing or inconsistent with the files.
    InvalidManifest(String),
    /// A single bundle resource exceeds its category ceiling.
    AssetTooLarge {
        path: String,
        category: AssetCategory,
        actual: u64,
        limit: u64,
    },
    /// The bundle as a whole exceeds its tier ceiling.
    BundleTooLarge { actual: u64, limit: u64 },
}

impl ValidationIssue {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingAnchor => "missing_anchor",
            Self::MissingOperation(_) => "missing_operation",
            Self::ForbiddenCapability(_) => "forbidden_capability",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::InvalidThumbnail(_) => "invalid_thumbnail",
            Self::InvalidManifest(_) => "invalid_manifest",
            Self::AssetTooLarge { .. } => "asset_too_large",
            Self::BundleTooLarge { .. } => "bundle_too_large",
        }
    }

    /// Human-readable description of the fix needed.
    pub fn detail(&self) -> String {
        match self {
            Self::MissingAnchor => {
                "operations must be assigned to window.GAME (dot or bracket access)".to_string()
            }
            Self::MissingOperation(op) => format!("required operation '{}' not found", op),
            Self::ForbiddenCapability(pattern) => {
                format!("disallowed capability '{}' is used", pattern)
            }
            Self::SizeExceeded { actual, limit } => {
                format!("source is {} bytes, limit is {} bytes", actual, limit)
            }
            Self::InvalidThumbnail(detail) => detail.clone(),
            Self::InvalidManifest(detail) => detail.clone(),
            Self::AssetTooLarge {
                path,
                category,
                actual,
                limit,
            } => format!(
                "{} resource '{}' is {} bytes, limit is {} bytes",
                category, path, actual, limit
            ),
            Self::BundleTooLarge { actual, limit } => {
                format!("bundle is {} bytes, tier limit is {} bytes", actual, limit)
            }
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

impl Serialize for ValidationIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ValidationIssue", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("detail", &self.detail())?;
        s.end()
    }
}

/// Outcome of scanning a submission.
///
/// A non-empty issue list means the submission is rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        self.issues.extend(issues);
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turn a failing report into [`crate::Error::Rejected`].
    pub fn into_result(self) -> crate::Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(crate::Error::Rejected(self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_serializes_kind_and_detail() {
        let json = serde_json::to_value(ValidationIssue::ForbiddenCapability("eval(".into())).unwrap();
        assert_eq!(json["kind"], "forbidden_capability");
        assert!(json["detail"].as_str().unwrap().contains("eval("));
    }

    #[test]
    fn test_report_pass_fail() {
        let mut report = ValidationReport::new();
        assert!(report.passed());
        assert!(report.clone().into_result().is_ok());

        report.push(ValidationIssue::MissingAnchor);
        assert!(!report.passed());
        assert!(matches!(report.into_result(), Err(crate::Error::Rejected(_))));
    }
}
