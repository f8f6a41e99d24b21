use chrono::Utc;
use hiraku::handlers::*;
use hiraku_core::analyze::{AnalysisReport, RouteAnalysis};
use hiraku_core::validate::{IssueKind, Severity, ValidationIssue};
use hiraku_core::{OgMetadata, RouteDescriptor};

#[test]
fn test_parse_param_spec_simple() {
    let (pattern, key, value) = parse_param_spec("/blog/[slug]:slug=hello-world").unwrap();
    assert_eq!(pattern, "/blog/[slug]");
    assert_eq!(key, "slug");
    assert_eq!(value, "hello-world");
}

#[test]
fn test_parse_param_spec_value_with_equals() {
    let (pattern, key, value) = parse_param_spec("/q/[term]:term=a=b").unwrap();
    assert_eq!(pattern, "/q/[term]");
    assert_eq!(key, "term");
    assert_eq!(value, "a=b");
}

#[test]
fn test_parse_param_spec_missing_colon() {
    assert!(parse_param_spec("slug=hello").is_err());
}

#[test]
fn test_parse_param_spec_missing_assignment() {
    assert!(parse_param_spec("/blog/[slug]:slug").is_err());
}

#[test]
fn test_parse_param_spec_empty_key() {
    assert!(parse_param_spec("/blog/[slug]:=x").is_err());
}

#[test]
fn test_build_sample_params_merges_per_pattern() {
    let specs = vec![
        "/docs/[section]/[page]:section=guide".to_string(),
        "/docs/[section]/[page]:page=intro".to_string(),
        "/blog/[slug]:slug=hello".to_string(),
    ];

    let params = build_sample_params(specs.iter()).unwrap();
    assert_eq!(params.len(), 2);

    let docs = params.get("/docs/[section]/[page]").unwrap();
    assert_eq!(docs.get("section").map(String::as_str), Some("guide"));
    assert_eq!(docs.get("page").map(String::as_str), Some("intro"));
}

#[test]
fn test_build_sample_params_propagates_errors() {
    let specs = vec!["broken".to_string()];
    assert!(build_sample_params(specs.iter()).is_err());
}

#[test]
fn test_resolve_root_plain_path() {
    let path = resolve_root("/srv/site");
    assert_eq!(path.to_str(), Some("/srv/site"));
}

#[test]
fn test_resolve_root_expands_tilde() {
    let path = resolve_root("~/site");
    assert!(!path.to_string_lossy().starts_with('~'));
}

fn report_with_issues(issues: Vec<ValidationIssue>) -> AnalysisReport {
    AnalysisReport {
        routes: vec![RouteAnalysis {
            route: RouteDescriptor::from_path("/"),
            metadata: OgMetadata::default(),
            images: Vec::new(),
            issues,
            skipped: None,
        }],
        base_url: "http://127.0.0.1:3000/".to_string(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        server_owned: false,
    }
}

#[test]
fn test_exit_code_clean_report() {
    let report = report_with_issues(vec![ValidationIssue::new(
        IssueKind::MissingField,
        Severity::Warning,
        "No og:description or meta description found.",
        Some("description"),
    )]);
    assert_eq!(report_exit_code(&report), 0);
}

#[test]
fn test_exit_code_with_errors() {
    let report = report_with_issues(vec![ValidationIssue::new(
        IssueKind::ImageUnreachable,
        Severity::Error,
        "Referenced image /gone.png is unreachable.",
        Some("image"),
    )]);
    assert_eq!(report_exit_code(&report), 1);
}
