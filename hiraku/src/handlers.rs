use hiraku_core::analyze::SampleParams;
use hiraku_core::validate::Severity;
use std::collections::HashMap;
use std::path::PathBuf;

// Helper functions for the analyze handler

/// Expand a user-supplied root argument (tilde included) into a path.
pub fn resolve_root(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Parse one `--param` specification of the form `PATTERN:KEY=VALUE`,
/// e.g. `/blog/[slug]:slug=hello-world`.
pub fn parse_param_spec(spec: &str) -> Result<(String, String, String), String> {
    let (pattern, assignment) = spec
        .rsplit_once(':')
        .ok_or_else(|| format!("expected 'PATTERN:KEY=VALUE', got '{}'", spec))?;
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected 'KEY=VALUE' after ':', got '{}'", assignment))?;

    if pattern.is_empty() || key.is_empty() {
        return Err(format!("empty pattern or key in '{}'", spec));
    }

    Ok((pattern.to_string(), key.to_string(), value.to_string()))
}

/// Fold repeated `--param` specifications into the engine's sample map.
pub fn build_sample_params<'a>(
    specs: impl Iterator<Item = &'a String>,
) -> Result<SampleParams, String> {
    let mut sample_params = SampleParams::new();
    for spec in specs {
        let (pattern, key, value) = parse_param_spec(spec)?;
        sample_params
            .entry(pattern)
            .or_insert_with(HashMap::new)
            .insert(key, value);
    }
    Ok(sample_params)
}

/// Exit code for CI use: non-zero when any route has an error-severity
/// issue.
pub fn report_exit_code(report: &AnalysisReport) -> i32 {
    if report.issue_count(Severity::Error) > 0 {
        1
    } else {
        0
    }
}

// Re-export the engine surface from hiraku-core
pub use hiraku_core::analyze::{
    AnalysisReport, AnalyzeOptions, ProgressCallback, RunPhase, analyze,
};
pub use hiraku_core::report::{ReportFormat, render_report, save_report};
