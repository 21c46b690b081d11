use std::io::Cursor;

use playgate_core::types::{
    source_ceiling, Dimensionality, SourceMode, Submission, ValidationIssue,
};
use playgate_validator::Validator;

const CLEAN_MODULE: &str = r#"
(function () {
  var state = { score: 0, ended: false, x: 0 };
  // Storage would be localStorage, but comments are ignored.
  window.GAME = {
    init: function () { state = { score: 0, ended: false, x: 0 }; },
    start() { state.ended = false; },
    reset: () => { state = { score: 0, ended: false, x: 0 }; },
    readState() { return { score: state.score, ended: state.ended }; },
    dispatchInput(action) {
      if (action === 'right') { state.x += 1; state.score += 1; return true; }
      return false;
    },
    readMeta: () => ({ name: 'Walker', description: 'Walk right', controls: { right: 'move' } })
  };
})();
"#;

fn pad_to(source: &str, len: usize) -> String {
    let mut out = source.to_string();
    out.push_str("\n/*");
    while out.len() < len - 2 {
        out.push(' ');
    }
    out.push_str("*/");
    assert_eq!(out.len(), len);
    out
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[test]
fn test_clean_accept_40k_inline_2d() {
    let source = pad_to(CLEAN_MODULE, 40_960);
    let submission = Submission::inline("agent-a", source, Dimensionality::TwoD);

    let report = Validator::new().validate(&submission);
    assert!(report.passed(), "unexpected issues: {:?}", report.issues());
}

#[test]
fn test_partial_reject_reports_exactly_missing_op_and_eval() {
    let source = CLEAN_MODULE
        .replace(
            "readMeta: () => ({ name: 'Walker', description: 'Walk right', controls: { right: 'move' } })",
            "meta: 1",
        )
        .replace("state.x += 1;", "state.x += eval('1');");
    let submission = Submission::inline("agent-a", source, Dimensionality::TwoD);

    let report = Validator::new().validate(&submission);
    assert_eq!(
        report.issues(),
        &[
            ValidationIssue::MissingOperation("readMeta".to_string()),
            ValidationIssue::ForbiddenCapability("eval(".to_string()),
        ]
    );
}

#[test]
fn test_completeness_two_missing_two_forbidden() {
    let source = CLEAN_MODULE
        .replace("init: function ()", "boot: function ()")
        .replace("start() {", "begin() {")
        .replace(
            "state.score += 1;",
            "state.score += 1; fetch('/x'); localStorage.setItem('s', 1);",
        );
    let submission = Submission::inline("agent-a", source, Dimensionality::TwoD);

    let report = Validator::new().validate(&submission);
    assert_eq!(
        report.issues(),
        &[
            ValidationIssue::MissingOperation("init".to_string()),
            ValidationIssue::MissingOperation("start".to_string()),
            ValidationIssue::ForbiddenCapability("localStorage".to_string()),
            ValidationIssue::ForbiddenCapability("fetch(".to_string()),
        ]
    );
}

#[test]
fn test_size_boundary() {
    let limit = source_ceiling(SourceMode::InlineScript, Dimensionality::TwoD) as usize;
    let validator = Validator::new();

    let at_limit = Submission::inline("a", pad_to(CLEAN_MODULE, limit), Dimensionality::TwoD);
    assert!(validator.validate(&at_limit).passed());

    let over = Submission::inline("a", pad_to(CLEAN_MODULE, limit + 1), Dimensionality::TwoD);
    assert_eq!(
        validator.validate(&over).issues(),
        &[ValidationIssue::SizeExceeded {
            actual: limit as u64 + 1,
            limit: limit as u64,
        }]
    );

    // The same bytes fit a full document.
    let doc = Submission::inline("a", pad_to(CLEAN_MODULE, limit + 1), Dimensionality::TwoD)
        .with_mode(SourceMode::FullDocument);
    assert!(validator.validate(&doc).passed());
}

#[test]
fn test_missing_anchor_and_issue_order() {
    let source = CLEAN_MODULE.replace("window.GAME =", "var GAME =");
    let submission = Submission::inline("a", source, Dimensionality::ThreeD);
    let report = Validator::new().validate(&submission);
    assert_eq!(report.issues(), &[ValidationIssue::MissingAnchor]);
}

#[test]
fn test_comment_only_definitions_do_not_count() {
    let source = CLEAN_MODULE.replace(
        "readMeta: () =>",
        "/* readMeta: () => */ notMeta: () =>",
    );
    let report = Validator::new().validate(&Submission::inline("a", source, Dimensionality::TwoD));
    assert_eq!(
        report.issues(),
        &[ValidationIssue::MissingOperation("readMeta".to_string())]
    );
}

#[test]
fn test_thumbnail_required_and_checked() {
    let validator = Validator::new().with_required_thumbnail(true);

    let without = Submission::inline("a", CLEAN_MODULE, Dimensionality::TwoD);
    let issues = validator.validate(&without).into_issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind(), "invalid_thumbnail");

    let tiny = Submission::inline("a", CLEAN_MODULE, Dimensionality::TwoD)
        .with_thumbnail(bytes::Bytes::from(png(32, 32)));
    assert_eq!(validator.validate(&tiny).issues().len(), 1);

    let good = Submission::inline("a", CLEAN_MODULE, Dimensionality::TwoD)
        .with_thumbnail(bytes::Bytes::from(png(256, 256)));
    assert!(validator.validate(&good).passed());
}
