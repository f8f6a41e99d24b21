// Rule checks applied to a page's extracted metadata and probed images

use hiraku_scanner::{ImageInfo, OgMetadata};
use serde::{Deserialize, Serialize};

/// Description length beyond which link previews truncate.
const DESCRIPTION_MAX_CHARS: usize = 300;
const TITLE_MAX_CHARS: usize = 70;

/// Common social-card aspect ratios: 1.91:1 (standard card), 16:9, 1:1.
const CARD_RATIOS: [f64; 3] = [1.91, 16.0 / 9.0, 1.0];
const RATIO_TOLERANCE: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    FetchFailed,
    ImageUnreachable,
    MissingField,
    LengthWarning,
    AspectRatioWarning,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::FetchFailed => "fetch_failed",
            IssueKind::ImageUnreachable => "image_unreachable",
            IssueKind::MissingField => "missing_field",
            IssueKind::LengthWarning => "length_warning",
            IssueKind::AspectRatioWarning => "aspect_ratio_warning",
        }
    }
}

/// A single validation finding. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub field: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        message: impl Into<String>,
        field: Option<&str>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            field: field.map(String::from),
        }
    }
}

/// Issue recorded by the orchestrator when a route's page could not be
/// fetched at all.
pub fn fetch_failed_issue(detail: impl std::fmt::Display) -> ValidationIssue {
    ValidationIssue::new(
        IssueKind::FetchFailed,
        Severity::Error,
        format!("Page fetch failed: {}", detail),
        None,
    )
}

pub fn check_required_fields(metadata: &OgMetadata) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if metadata.title.is_none() {
        issues.push(ValidationIssue::new(
            IssueKind::MissingField,
            Severity::Warning,
            "No og:title or <title> found; link previews will have no title.",
            Some("title"),
        ));
    }
    if metadata.description.is_none() {
        issues.push(ValidationIssue::new(
            IssueKind::MissingField,
            Severity::Warning,
            "No og:description or meta description found.",
            Some("description"),
        ));
    }
    if metadata.image_url.is_none() {
        issues.push(ValidationIssue::new(
            IssueKind::MissingField,
            Severity::Warning,
            "No og:image found; link previews will render without a card image.",
            Some("image"),
        ));
    }

    issues
}

pub fn check_lengths(metadata: &OgMetadata) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Some(ref description) = metadata.description
        && description.chars().count() > DESCRIPTION_MAX_CHARS
    {
        issues.push(ValidationIssue::new(
            IssueKind::LengthWarning,
            Severity::Info,
            format!(
                "Description is {} characters; most previews truncate beyond {}.",
                description.chars().count(),
                DESCRIPTION_MAX_CHARS
            ),
            Some("description"),
        ));
    }

    if let Some(ref title) = metadata.title
        && title.chars().count() > TITLE_MAX_CHARS
    {
        issues.push(ValidationIssue::new(
            IssueKind::LengthWarning,
            Severity::Info,
            format!(
                "Title is {} characters; most previews truncate beyond {}.",
                title.chars().count(),
                TITLE_MAX_CHARS
            ),
            Some("title"),
        ));
    }

    issues
}

pub fn check_image_reachability(images: &[ImageInfo]) -> Vec<ValidationIssue> {
    images
        .iter()
        .filter(|image| !image.reachable)
        .map(|image| {
            ValidationIssue::new(
                IssueKind::ImageUnreachable,
                Severity::Error,
                format!("Referenced image {} is unreachable.", image.url),
                Some("image"),
            )
        })
        .collect()
}

pub fn check_aspect_ratios(images: &[ImageInfo]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for image in images {
        let Some((width, height)) = image.dimensions() else {
            continue;
        };
        if width == 0 || height == 0 {
            continue;
        }
        let ratio = width as f64 / height as f64;
        let near_common = CARD_RATIOS
            .iter()
            .any(|expected| ((ratio - expected) / expected).abs() <= RATIO_TOLERANCE);
        if !near_common {
            issues.push(ValidationIssue::new(
                IssueKind::AspectRatioWarning,
                Severity::Info,
                format!(
                    "Image {} is {}x{} (ratio {:.2}), far from common card ratios (1.91:1, 16:9, 1:1).",
                    image.url, width, height, ratio
                ),
                Some("image"),
            ));
        }
    }

    issues
}

/// Runs every rule check. Rules are independent and order-insensitive;
/// this never fails, it only appends issues.
pub fn validate_metadata(metadata: &OgMetadata, images: &[ImageInfo]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    issues.extend(check_required_fields(metadata));
    issues.extend(check_lengths(metadata));
    issues.extend(check_image_reachability(images));
    issues.extend(check_aspect_ratios(images));

    issues
}
