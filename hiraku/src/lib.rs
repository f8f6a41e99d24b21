// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{build_sample_params, parse_param_spec, report_exit_code, resolve_root};

// Re-export the engine surface from hiraku-core
pub use hiraku_core::analyze::{AnalysisReport, AnalyzeOptions, RunPhase, analyze};
pub use hiraku_core::report::{ReportFormat, render_report, save_report};
