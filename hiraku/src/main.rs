use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use hiraku::handlers::{build_sample_params, report_exit_code, resolve_root};
use hiraku_core::analyze::{AnalyzeOptions, ProgressCallback, analyze};
use hiraku_core::report::{ReportFormat, render_report, save_report};
use hiraku_core::validate::Severity;
use hiraku_core::{Database, print_banner, validate_metadata};
use hiraku_scanner::metadata::build_http_client;
use hiraku_scanner::{discover_routes, fetch_and_parse_og_metadata, fetch_image_info};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("analyze", primary_command)) => handle_analyze(primary_command, quiet).await,
        Some(("routes", primary_command)) => handle_routes(primary_command),
        Some(("check", primary_command)) => handle_check(primary_command).await,
        None => {}
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

fn make_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

async fn handle_analyze(sub_matches: &ArgMatches, quiet: bool) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let root = resolve_root(sub_matches.get_one::<String>("root").unwrap());
    let port = sub_matches.get_one::<u16>("port").copied();
    let base_url = sub_matches.get_one::<Url>("url").cloned();
    let concurrency = *sub_matches.get_one::<usize>("concurrency").unwrap_or(&8);
    let timeout_ms = *sub_matches.get_one::<u64>("timeout-ms").unwrap_or(&30_000);
    let deadline_ms = sub_matches.get_one::<u64>("deadline-ms").copied();
    let output = sub_matches.get_one::<std::path::PathBuf>("output");
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    let param_specs: Vec<String> = sub_matches
        .get_many::<String>("param")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let sample_params = match build_sample_params(param_specs.iter()) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("{} {}", "✗ Invalid --param:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let spinner = if quiet { None } else { Some(make_spinner()) };
    if let Some(ref spinner) = spinner {
        spinner.set_message("Starting analysis...");
    }

    let mut options = AnalyzeOptions::new(&root)
        .with_concurrency(concurrency)
        .with_timeout(Duration::from_millis(timeout_ms))
        .with_sample_params(sample_params);
    if let Some(port) = port {
        options = options.with_port(port);
    }
    if let Some(base_url) = base_url {
        options = options.with_base_url(base_url);
    }
    if let Some(deadline_ms) = deadline_ms {
        options = options.with_deadline(Duration::from_millis(deadline_ms));
    }
    if let Some(ref spinner) = spinner {
        let spinner = spinner.clone();
        let callback: ProgressCallback = Arc::new(move |phase, message: String| {
            spinner.set_message(format!("[{}] {}", phase.as_str(), message));
        });
        options = options.with_progress_callback(callback);
    }

    match analyze(options).await {
        Ok(report) => {
            if let Some(ref spinner) = spinner {
                spinner.finish_and_clear();
            }

            let errors = report.issue_count(Severity::Error);
            let warnings = report.issue_count(Severity::Warning);
            if !quiet {
                println!(
                    "\n{} {} routes analyzed ({} errors, {} warnings)\n",
                    "✓".green().bold(),
                    report.routes.len(),
                    errors,
                    warnings
                );
            }

            let content = render_report(&report, &format);
            if let Some(path) = output {
                match save_report(&content, path) {
                    Ok(()) => println!("Report saved to {}", path.display()),
                    Err(e) => {
                        eprintln!("{} {}", "✗ Failed to save report:".red().bold(), e);
                        std::process::exit(1);
                    }
                }
            } else {
                print!("{}", content);
            }

            if let Some(db_path) = sub_matches.get_one::<String>("db") {
                persist_run(&report, &root, db_path);
            }

            std::process::exit(report_exit_code(&report));
        }
        Err(e) => {
            if let Some(ref spinner) = spinner {
                spinner.finish_and_clear();
            }
            eprintln!("{} {}", "✗ Analysis failed:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn persist_run(report: &hiraku_core::AnalysisReport, root: &std::path::Path, db_path: &str) {
    let db_path = resolve_root(db_path);
    match Database::new(&db_path).and_then(|db| db.store_report(report, &root.display().to_string()))
    {
        Ok(run_id) => println!("Run {} stored in {}", run_id, db_path.display()),
        Err(e) => eprintln!("{} {}", "✗ Failed to store run:".red().bold(), e),
    }
}

fn handle_routes(sub_matches: &ArgMatches) {
    let root = resolve_root(sub_matches.get_one::<String>("root").unwrap());

    match discover_routes(&root) {
        Ok(routes) => {
            println!("{} routes in {}\n", routes.len(), root.display());
            for route in &routes {
                if route.is_dynamic {
                    println!(
                        "  {} {}",
                        route.path,
                        format!("[dynamic: {}]", route.param_names.join(", ")).bright_black()
                    );
                } else {
                    println!("  {}", route.path);
                }
            }
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Route discovery failed:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn handle_check(sub_matches: &ArgMatches) {
    let url = sub_matches.get_one::<Url>("url").unwrap();

    let client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let metadata = match fetch_and_parse_og_metadata(&client, url).await {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("{} {}", "✗ Fetch failed:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!("Metadata for {}\n", url);
    println!("  title:       {}", metadata.title.as_deref().unwrap_or("-"));
    println!(
        "  description: {}",
        metadata.description.as_deref().unwrap_or("-")
    );
    println!(
        "  image:       {}",
        metadata.image_url.as_deref().unwrap_or("-")
    );
    println!(
        "  site_name:   {}",
        metadata.site_name.as_deref().unwrap_or("-")
    );
    println!("  type:        {}", metadata.kind.as_deref().unwrap_or("-"));

    let mut images = Vec::new();
    if let Some(ref image_url) = metadata.image_url {
        images.push(fetch_image_info(&client, url, image_url).await);
    }

    let issues = validate_metadata(&metadata, &images);
    if issues.is_empty() {
        println!("\n{} No issues found", "✓".green().bold());
        return;
    }

    println!();
    let mut has_errors = false;
    for issue in &issues {
        let label = match issue.severity {
            Severity::Error => {
                has_errors = true;
                "[ERROR]".red().bold()
            }
            Severity::Warning => "[WARNING]".yellow().bold(),
            Severity::Info => "[INFO]".bright_black().bold(),
        };
        println!("  {} {}", label, issue.message);
    }

    if has_errors {
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
