pub mod analyze;
pub mod data;
pub mod report;
pub mod validate;

pub use analyze::{
    AnalysisReport, AnalyzeOptions, ProgressCallback, RouteAnalysis, RunPhase, SampleParams,
    analyze,
};
pub use data::Database;
pub use report::{ReportFormat, render_report, save_report};
pub use validate::{IssueKind, Severity, ValidationIssue, validate_metadata};

// Re-export the scanner surface so binary consumers need one dependency.
pub use hiraku_scanner::{
    AnalyzeError, ImageInfo, OgMetadata, RouteDescriptor, ServerHandle, discover_routes,
    fetch_and_parse_og_metadata, fetch_image_info, find_next_dir, find_running_server,
    parse_og_metadata, start_server, validate_next_dir, wait_for_server,
};

pub fn print_banner() {
    use colored::Colorize;

    println!("{}", r#"
  _     _           _
 | |__ (_)_ __ __ _| | ___   _
 | '_ \| | '__/ _` | |/ / | | |
 | | | | | | | (_| |   <| |_| |
 |_| |_|_|_|  \__,_|_|\_\\__,_|
"#.bright_cyan());
    println!(
        "  {} v{}\n",
        "Open Graph metadata analyzer".bright_white(),
        env!("CARGO_PKG_VERSION")
    );
}
