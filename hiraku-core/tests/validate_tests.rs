// Tests for metadata validation rules

use hiraku_core::validate::{IssueKind, Severity, validate_metadata};
use hiraku_core::{ImageInfo, OgMetadata};
use std::collections::HashSet;

fn full_metadata() -> OgMetadata {
    OgMetadata {
        title: Some("Example Page".to_string()),
        description: Some("A perfectly reasonable description.".to_string()),
        image_url: Some("https://cdn.example.com/card.png".to_string()),
        site_name: Some("Example".to_string()),
        kind: Some("website".to_string()),
    }
}

fn reachable_image(width: u32, height: u32) -> ImageInfo {
    ImageInfo {
        url: "https://cdn.example.com/card.png".to_string(),
        reachable: true,
        content_type: Some("image/png".to_string()),
        width: Some(width),
        height: Some(height),
        size_bytes: Some(40_000),
    }
}

// ============================================================================
// Round-trip / clean input
// ============================================================================

#[test]
fn fully_populated_metadata_with_valid_image_has_no_errors() {
    let issues = validate_metadata(&full_metadata(), &[reachable_image(1200, 630)]);
    assert!(
        issues.iter().all(|i| i.severity != Severity::Error),
        "unexpected errors: {:?}",
        issues
    );
}

#[test]
fn standard_card_image_has_no_ratio_warning() {
    let issues = validate_metadata(&full_metadata(), &[reachable_image(1200, 630)]);
    assert!(
        !issues.iter().any(|i| i.kind == IssueKind::AspectRatioWarning),
        "1200x630 is the standard card ratio: {:?}",
        issues
    );
}

// ============================================================================
// Missing fields
// ============================================================================

#[test]
fn missing_description_is_a_warning() {
    let mut metadata = full_metadata();
    metadata.description = None;

    let issues = validate_metadata(&metadata, &[reachable_image(1200, 630)]);
    let missing: Vec<_> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::MissingField)
        .collect();

    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].severity, Severity::Warning);
    assert_eq!(missing[0].field.as_deref(), Some("description"));
}

#[test]
fn missing_title_is_a_warning() {
    let mut metadata = full_metadata();
    metadata.title = None;

    let issues = validate_metadata(&metadata, &[reachable_image(1200, 630)]);
    assert!(issues.iter().any(|i| {
        i.kind == IssueKind::MissingField
            && i.severity == Severity::Warning
            && i.field.as_deref() == Some("title")
    }));
}

#[test]
fn empty_metadata_reports_every_required_field() {
    let issues = validate_metadata(&OgMetadata::default(), &[]);
    let fields: HashSet<&str> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::MissingField)
        .filter_map(|i| i.field.as_deref())
        .collect();

    assert_eq!(fields, HashSet::from(["title", "description", "image"]));
}

// ============================================================================
// Length checks
// ============================================================================

#[test]
fn long_description_is_informational() {
    let mut metadata = full_metadata();
    metadata.description = Some("x".repeat(301));

    let issues = validate_metadata(&metadata, &[reachable_image(1200, 630)]);
    let lengths: Vec<_> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::LengthWarning)
        .collect();

    assert_eq!(lengths.len(), 1);
    assert_eq!(lengths[0].severity, Severity::Info);
    assert_eq!(lengths[0].field.as_deref(), Some("description"));
}

#[test]
fn boundary_description_length_passes() {
    let mut metadata = full_metadata();
    metadata.description = Some("x".repeat(300));

    let issues = validate_metadata(&metadata, &[reachable_image(1200, 630)]);
    assert!(!issues.iter().any(|i| i.kind == IssueKind::LengthWarning));
}

#[test]
fn long_title_is_informational() {
    let mut metadata = full_metadata();
    metadata.title = Some("t".repeat(71));

    let issues = validate_metadata(&metadata, &[reachable_image(1200, 630)]);
    assert!(issues.iter().any(|i| {
        i.kind == IssueKind::LengthWarning && i.field.as_deref() == Some("title")
    }));
}

// ============================================================================
// Image checks
// ============================================================================

#[test]
fn unreachable_image_is_an_error() {
    let image = ImageInfo::unreachable("https://cdn.example.com/gone.png".to_string());
    let issues = validate_metadata(&full_metadata(), &[image]);

    let unreachable: Vec<_> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::ImageUnreachable)
        .collect();
    assert_eq!(unreachable.len(), 1);
    assert_eq!(unreachable[0].severity, Severity::Error);
}

#[test]
fn odd_aspect_ratio_is_informational() {
    let issues = validate_metadata(&full_metadata(), &[reachable_image(400, 1200)]);
    let ratios: Vec<_> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::AspectRatioWarning)
        .collect();

    assert_eq!(ratios.len(), 1);
    assert_eq!(ratios[0].severity, Severity::Info);
}

#[test]
fn square_and_widescreen_images_pass_ratio_check() {
    for (width, height) in [(800, 800), (1280, 720)] {
        let issues = validate_metadata(&full_metadata(), &[reachable_image(width, height)]);
        assert!(
            !issues.iter().any(|i| i.kind == IssueKind::AspectRatioWarning),
            "{}x{} should pass",
            width,
            height
        );
    }
}

#[test]
fn image_without_dimensions_skips_ratio_check() {
    let mut image = reachable_image(0, 0);
    image.width = None;
    image.height = None;

    let issues = validate_metadata(&full_metadata(), &[image]);
    assert!(!issues.iter().any(|i| i.kind == IssueKind::AspectRatioWarning));
}

// ============================================================================
// Determinism and order independence
// ============================================================================

#[test]
fn validation_is_deterministic() {
    let metadata = full_metadata();
    let images = vec![reachable_image(400, 1200), reachable_image(1200, 630)];

    assert_eq!(
        validate_metadata(&metadata, &images),
        validate_metadata(&metadata, &images)
    );
}

#[test]
fn shuffling_images_yields_the_same_issue_set() {
    let metadata = full_metadata();
    let forward = vec![
        reachable_image(400, 1200),
        ImageInfo::unreachable("https://cdn.example.com/a.png".to_string()),
        reachable_image(1200, 630),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let first: HashSet<_> = validate_metadata(&metadata, &forward).into_iter().collect();
    let second: HashSet<_> = validate_metadata(&metadata, &reversed).into_iter().collect();
    assert_eq!(first, second);
}
