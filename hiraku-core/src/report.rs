// Report generation from a completed analysis run

use crate::analyze::{AnalysisReport, RouteAnalysis};
use crate::validate::Severity;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

pub fn severity_counts(report: &AnalysisReport) -> SeverityCounts {
    SeverityCounts {
        errors: report.issue_count(Severity::Error),
        warnings: report.issue_count(Severity::Warning),
        info: report.issue_count(Severity::Info),
    }
}

/// Renders a report in the requested format.
pub fn render_report(report: &AnalysisReport, format: &ReportFormat) -> String {
    match format {
        ReportFormat::Text => generate_text_report(report),
        ReportFormat::Json => generate_json_report(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        ReportFormat::Markdown => generate_markdown_report(report),
    }
}

fn route_marker(analysis: &RouteAnalysis) -> &'static str {
    if analysis.skipped.is_some() {
        "○"
    } else if analysis.issue_count(Severity::Error) > 0 {
        "✗"
    } else if analysis.issue_count(Severity::Warning) > 0 {
        "⚠"
    } else {
        "✓"
    }
}

pub fn generate_text_report(report: &AnalysisReport) -> String {
    let counts = severity_counts(report);
    let mut out = String::new();

    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str("                     HIRAKU METADATA ANALYSIS REPORT\n");
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    out.push_str(&format!("Target:       {}\n", report.base_url));
    out.push_str(&format!(
        "Started:      {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let duration = report.finished_at - report.started_at;
    out.push_str(&format!(
        "Duration:     {}.{:03} seconds\n",
        duration.num_seconds(),
        duration.num_milliseconds().rem_euclid(1000)
    ));
    out.push_str(&format!(
        "Server:       {}\n",
        if report.server_owned {
            "launched by hiraku"
        } else {
            "already running"
        }
    ));
    out.push_str(&format!("Routes:       {}", report.routes.len()));
    if report.skipped_count() > 0 {
        out.push_str(&format!(" ({} skipped)", report.skipped_count()));
    }
    out.push_str("\n\n");

    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str("SUMMARY\n");
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let total = counts.errors + counts.warnings + counts.info;
    out.push_str(&format!("Total issues: {}\n\n", total));
    if counts.errors > 0 {
        out.push_str(&format!("  [ERROR]   {}  (must fix)\n", counts.errors));
    }
    if counts.warnings > 0 {
        out.push_str(&format!("  [WARNING] {}  (should fix)\n", counts.warnings));
    }
    if counts.info > 0 {
        out.push_str(&format!("  [INFO]    {}  (worth a look)\n", counts.info));
    }
    if total == 0 {
        out.push_str("  No issues found.\n");
    }
    out.push('\n');

    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str("ROUTES\n");
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for analysis in &report.routes {
        out.push_str(&format!("{} {}\n", route_marker(analysis), analysis.route.path));

        if let Some(ref reason) = analysis.skipped {
            out.push_str(&format!("    skipped: {}\n\n", reason));
            continue;
        }

        if let Some(ref title) = analysis.metadata.title {
            out.push_str(&format!("    title: {}\n", title));
        }
        for issue in &analysis.issues {
            out.push_str(&format!(
                "    [{}] {}\n",
                issue.severity.as_str().to_uppercase(),
                issue.message
            ));
        }
        out.push('\n');
    }

    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str("                             End of Report\n");
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    out
}

pub fn generate_json_report(report: &AnalysisReport) -> Result<String, serde_json::Error> {
    let counts = severity_counts(report);

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "hiraku",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "target": report.base_url,
                "started_at": report.started_at.to_rfc3339(),
                "finished_at": report.finished_at.to_rfc3339(),
                "server_owned": report.server_owned
            },
            "summary": {
                "total_routes": report.routes.len(),
                "skipped_routes": report.skipped_count(),
                "total_issues": counts.errors + counts.warnings + counts.info,
                "severity_breakdown": {
                    "error": counts.errors,
                    "warning": counts.warnings,
                    "info": counts.info
                }
            },
            "routes": report.routes
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(report: &AnalysisReport) -> String {
    let counts = severity_counts(report);
    let mut out = String::new();

    out.push_str("# Hiraku metadata analysis\n\n");
    out.push_str(&format!("- Target: `{}`\n", report.base_url));
    out.push_str(&format!(
        "- Started: {}\n",
        report.started_at.to_rfc3339()
    ));
    out.push_str(&format!(
        "- Issues: {} error, {} warning, {} info\n\n",
        counts.errors, counts.warnings, counts.info
    ));

    out.push_str("## Routes\n\n");
    for analysis in &report.routes {
        out.push_str(&format!("### `{}`\n\n", analysis.route.path));
        if let Some(ref reason) = analysis.skipped {
            out.push_str(&format!("Skipped: {}\n\n", reason));
            continue;
        }
        if analysis.issues.is_empty() {
            out.push_str("No issues.\n\n");
            continue;
        }
        for issue in &analysis.issues {
            out.push_str(&format!(
                "- **{}** ({}): {}\n",
                issue.kind.as_str(),
                issue.severity.as_str(),
                issue.message
            ));
        }
        out.push('\n');
    }

    out
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
