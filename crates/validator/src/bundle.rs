//! Packaged bundle audit.

use std::collections::{BTreeMap, BTreeSet};

use playgate_assets::normalize_bundle_path;
use playgate_core::types::{SourceMode, Submission, ValidationIssue};

/// Audit the manifest and resources of a packaged submission.
///
/// Issues come out in a stable order: manifest problems per entry in
/// manifest order, undeclared files, then the aggregate ceiling.
pub fn audit_bundle(submission: &Submission) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let bundle = match (&submission.mode, &submission.bundle) {
        (SourceMode::PackagedBundle, Some(bundle)) => bundle,
        (SourceMode::PackagedBundle, None) => {
            issues.push(ValidationIssue::InvalidManifest(
                "packaged bundles require a manifest".to_string(),
            ));
            return issues;
        }
        (_, Some(_)) => {
            issues.push(ValidationIssue::InvalidManifest(format!(
                "{} submissions cannot carry a bundle",
                submission.mode
            )));
            return issues;
        }
        (_, None) => return issues,
    };
    let tier = submission.tier.unwrap_or_default();

    let mut files = BTreeMap::new();
    for (path, data) in &bundle.files {
        match normalize_bundle_path(path) {
            Ok(normalized) => {
                files.insert(normalized, data.len() as u64);
            }
            Err(e) => issues.push(ValidationIssue::InvalidManifest(e.to_string())),
        }
    }

    let mut declared = BTreeSet::new();
    for entry in &bundle.manifest.entries {
        let path = match normalize_bundle_path(&entry.path) {
            Ok(p) => p,
            Err(e) => {
                issues.push(ValidationIssue::InvalidManifest(e.to_string()));
                continue;
            }
        };
        if !declared.insert(path.clone()) {
            issues.push(ValidationIssue::InvalidManifest(format!(
                "resource '{}' is declared more than once",
                path
            )));
            continue;
        }

        let Some(&actual) = files.get(&path) else {
            issues.push(ValidationIssue::InvalidManifest(format!(
                "declared resource '{}' is missing from the bundle",
                path
            )));
            continue;
        };
        if actual != entry.size {
            issues.push(ValidationIssue::InvalidManifest(format!(
                "resource '{}' is {} bytes but the manifest declares {}",
                path, actual, entry.size
            )));
        }

        let limit = tier.category_ceiling(entry.category);
        if actual > limit {
            issues.push(ValidationIssue::AssetTooLarge {
                path,
                category: entry.category,
                actual,
                limit,
            });
        }
    }

    for path in files.keys().filter(|p| !declared.contains(*p)) {
        issues.push(ValidationIssue::InvalidManifest(format!(
            "file '{}' is not declared in the manifest",
            path
        )));
    }

    let aggregate: u64 = files.values().sum();
    let limit = tier.aggregate_ceiling();
    if aggregate > limit {
        issues.push(ValidationIssue::BundleTooLarge {
            actual: aggregate,
            limit,
        });
    }

    issues
}
