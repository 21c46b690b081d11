//! The submission validator.

use std::sync::Arc;
use tracing::{debug, info};

use playgate_core::types::{
    source_ceiling, Operation, Submission, ValidationIssue, ValidationReport,
};

use crate::bundle::audit_bundle;
use crate::contract::{AnchorRule, OperationRule};
use crate::denylist;
use crate::lexer::strip_comments;
use crate::thumbnail::check_thumbnail;

/// Compiled rules, built once and shared read-only between validations.
#[derive(Debug)]
pub struct RuleSet {
    anchor: AnchorRule,
    operations: Vec<OperationRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            anchor: AnchorRule::new(),
            operations: Operation::ALL.into_iter().map(OperationRule::new).collect(),
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Static validator for submitted modules.
///
/// Every check runs on every submission and the issues are unioned in a
/// fixed order: size, anchor, operations, denylist, thumbnail, bundle.
/// The source text is only ever scanned, never executed.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: Arc<RuleSet>,
    require_thumbnail: bool,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RuleSet::new()),
            require_thumbnail: false,
        }
    }

    /// Treat a missing thumbnail as an issue.
    pub fn with_required_thumbnail(mut self, required: bool) -> Self {
        self.require_thumbnail = required;
        self
    }

    pub fn validate(&self, submission: &Submission) -> ValidationReport {
        let mut report = ValidationReport::new();

        let limit = source_ceiling(submission.mode, submission.dimensionality);
        let actual = submission.source_len();
        if actual > limit {
            report.push(ValidationIssue::SizeExceeded { actual, limit });
        }

        let stripped = strip_comments(&submission.source);

        if !self.rules.anchor.is_present(&stripped) {
            report.push(ValidationIssue::MissingAnchor);
        }

        for rule in &self.rules.operations {
            match rule.find_spelling(&stripped) {
                Some(spelling) => {
                    debug!(operation = %rule.operation, spelling, "Operation detected")
                }
                None => report.push(ValidationIssue::MissingOperation(
                    rule.operation.name().to_string(),
                )),
            }
        }

        report.extend(
            denylist::scan(&stripped)
                .into_iter()
                .map(|pattern| ValidationIssue::ForbiddenCapability(pattern.to_string())),
        );

        match &submission.thumbnail {
            Some(data) => {
                if let Err(issue) = check_thumbnail(data) {
                    report.push(issue);
                }
            }
            None if self.require_thumbnail => report.push(ValidationIssue::InvalidThumbnail(
                "a thumbnail image is required".to_string(),
            )),
            None => {}
        }

        report.extend(audit_bundle(submission));

        info!(
            agent_id = %submission.agent_id,
            mode = %submission.mode,
            dimensionality = %submission.dimensionality,
            source_bytes = actual,
            issues = report.issues().len(),
            "Submission validated"
        );
        report
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
