use crate::validate::{self, Severity, ValidationIssue, fetch_failed_issue};
use chrono::{DateTime, Utc};
use hiraku_scanner::error::{AnalyzeError, Result};
use hiraku_scanner::images::ImageCache;
use hiraku_scanner::metadata::{OgMetadata, build_http_client, fetch_and_parse_og_metadata};
use hiraku_scanner::routes::{NextRoutes, RouteDescriptor, RouteSource};
use hiraku_scanner::server::{ServerHandle, find_next_dir, find_running_server, start_server, wait_for_server};
use hiraku_scanner::ImageInfo;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Phases of an analysis run, in order. `Failed` is terminal and
/// reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Init,
    ServerReady,
    RoutesDiscovered,
    Crawling,
    Aggregating,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::ServerReady => "server_ready",
            RunPhase::RoutesDiscovered => "routes_discovered",
            RunPhase::Crawling => "crawling",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

/// Callback for reporting run progress (phase transitions and per-route
/// activity).
pub type ProgressCallback = Arc<dyn Fn(RunPhase, String) + Send + Sync>;

/// Sample values for dynamic route parameters, keyed by route pattern.
pub type SampleParams = HashMap<String, HashMap<String, String>>;

/// Options for configuring an analysis run.
pub struct AnalyzeOptions {
    pub app_root: PathBuf,
    pub port: Option<u16>,
    /// Base URL of an already-running server; skips locate/launch.
    pub base_url: Option<Url>,
    /// Readiness deadline for a located or spawned server.
    pub timeout: Duration,
    pub concurrency: usize,
    /// Overall run deadline; routes not started by then are skipped.
    pub deadline: Option<Duration>,
    pub sample_params: SampleParams,
    pub progress: Option<ProgressCallback>,
}

impl AnalyzeOptions {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            port: None,
            base_url: None,
            timeout: DEFAULT_READY_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            deadline: None,
            sample_params: SampleParams::new(),
            progress: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_sample_params(mut self, sample_params: SampleParams) -> Self {
        self.sample_params = sample_params;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }
}

/// Completed analysis of one route. Never exposed while in flight:
/// fetch, parse and both validation phases have finished (or their
/// failure was recorded) before this exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub route: RouteDescriptor,
    pub metadata: OgMetadata,
    pub images: Vec<ImageInfo>,
    pub issues: Vec<ValidationIssue>,
    /// Reason the route was not crawled, when it wasn't.
    pub skipped: Option<String>,
}

impl RouteAnalysis {
    fn skipped(route: RouteDescriptor, reason: String) -> Self {
        Self {
            route,
            metadata: OgMetadata::default(),
            images: Vec::new(),
            issues: Vec::new(),
            skipped: Some(reason),
        }
    }

    pub fn issue_count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// The sole externally consumed artifact of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub routes: Vec<RouteAnalysis>,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub server_owned: bool,
}

impl AnalysisReport {
    pub fn issue_count(&self, severity: Severity) -> usize {
        self.routes.iter().map(|r| r.issue_count(severity)).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.routes.iter().filter(|r| r.skipped.is_some()).count()
    }
}

fn emit(progress: &Option<ProgressCallback>, phase: RunPhase, message: impl Into<String>) {
    if let Some(callback) = progress {
        callback(phase, message.into());
    }
}

/// Runs a complete analysis: locate or launch the server, wait for
/// readiness, discover routes, crawl them under bounded concurrency,
/// aggregate, and tear the server down.
///
/// Resolves with a full report or rejects with exactly one fatal setup
/// error; a spawned server is terminated on every exit path before this
/// returns.
pub async fn analyze(options: AnalyzeOptions) -> Result<AnalysisReport> {
    let started_at = Utc::now();
    emit(&options.progress, RunPhase::Init, "locating server");

    let mut handle = match acquire_server(&options).await {
        Ok(handle) => handle,
        Err(e) => {
            emit(&options.progress, RunPhase::Failed, e.to_string());
            return Err(e);
        }
    };
    let server_owned = handle.owned();
    info!("Analyzing against {} (owned: {})", handle.base_url(), server_owned);

    // Everything past acquisition runs in the inner pipeline so teardown
    // executes whether it succeeds or fails.
    let outcome = run_pipeline(&options, &mut handle, started_at).await;
    handle.shutdown().await;

    match outcome {
        Ok(mut report) => {
            report.server_owned = server_owned;
            emit(
                &options.progress,
                RunPhase::Done,
                format!("{} routes analyzed", report.routes.len()),
            );
            Ok(report)
        }
        Err(e) => {
            emit(&options.progress, RunPhase::Failed, e.to_string());
            Err(e)
        }
    }
}

async fn acquire_server(options: &AnalyzeOptions) -> Result<ServerHandle> {
    if let Some(ref base_url) = options.base_url {
        return Ok(ServerHandle::running(base_url.clone()));
    }

    if let Some(handle) = find_running_server(options.port).await {
        return Ok(handle);
    }

    let app_root = find_next_dir(&options.app_root).ok_or_else(|| {
        AnalyzeError::ServerLaunch(format!(
            "{} is not inside a Next.js application",
            options.app_root.display()
        ))
    })?;
    start_server(&app_root, options.port).await
}

async fn run_pipeline(
    options: &AnalyzeOptions,
    handle: &mut ServerHandle,
    started_at: DateTime<Utc>,
) -> Result<AnalysisReport> {
    let base_url = handle.base_url().clone();

    if let Err(e) = wait_for_server(&base_url, options.timeout).await {
        // A spawned process that died before readiness is a launch
        // failure, not a timeout.
        if let Some(status) = handle.try_exited() {
            return Err(AnalyzeError::ServerLaunch(format!(
                "server process exited ({}) before becoming ready",
                status
            )));
        }
        return Err(e);
    }
    emit(&options.progress, RunPhase::ServerReady, base_url.to_string());

    let app_root = find_next_dir(&options.app_root).unwrap_or_else(|| options.app_root.clone());
    let routes = NextRoutes.discover(&app_root)?;
    emit(
        &options.progress,
        RunPhase::RoutesDiscovered,
        format!("{} routes", routes.len()),
    );

    crawl_routes(options, &base_url, routes, started_at).await
}

async fn crawl_routes(
    options: &AnalyzeOptions,
    base_url: &Url,
    routes: Vec<RouteDescriptor>,
    started_at: DateTime<Utc>,
) -> Result<AnalysisReport> {
    emit(
        &options.progress,
        RunPhase::Crawling,
        format!("crawling {} routes", routes.len()),
    );

    let client = build_http_client()?;
    let cache = Arc::new(ImageCache::new());
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let run_deadline = options.deadline.map(|d| Instant::now() + d);

    // Results land in index-addressed slots so the report preserves
    // discovery order regardless of completion order.
    let slots: Arc<Mutex<Vec<Option<RouteAnalysis>>>> =
        Arc::new(Mutex::new(routes.iter().map(|_| None).collect()));

    let mut tasks = Vec::new();
    for (index, route) in routes.into_iter().enumerate() {
        let target = match resolve_route_url(base_url, &route, &options.sample_params) {
            Ok(url) => url,
            Err(reason) => {
                debug!("Skipping {}: {}", route.path, reason);
                slots.lock().await[index] = Some(RouteAnalysis::skipped(route, reason));
                continue;
            }
        };

        let client = client.clone();
        let cache = cache.clone();
        let semaphore = semaphore.clone();
        let slots = slots.clone();
        let progress = options.progress.clone();

        tasks.push(tokio::spawn(async move {
            let permit = semaphore.acquire().await;
            if permit.is_err() {
                slots.lock().await[index] =
                    Some(RouteAnalysis::skipped(route, "worker pool closed".to_string()));
                return;
            }

            if let Some(deadline) = run_deadline
                && Instant::now() >= deadline
            {
                slots.lock().await[index] = Some(RouteAnalysis::skipped(
                    route,
                    "run deadline exceeded".to_string(),
                ));
                return;
            }

            emit(&progress, RunPhase::Crawling, route.path.clone());
            let analysis = analyze_route(&client, &cache, route, &target).await;
            slots.lock().await[index] = Some(analysis);
        }));
    }

    for joined in futures::future::join_all(tasks).await {
        joined?;
    }

    emit(&options.progress, RunPhase::Aggregating, "building report");

    let mut slots = slots.lock().await;
    let collected: Vec<RouteAnalysis> = slots
        .iter_mut()
        .map(|slot| {
            slot.take().unwrap_or_else(|| {
                // Only reachable if a worker was cancelled before writing
                // its slot; surface that as a skip, never a gap.
                RouteAnalysis::skipped(
                    RouteDescriptor::from_path("/"),
                    "route task did not complete".to_string(),
                )
            })
        })
        .collect();

    Ok(AnalysisReport {
        routes: collected,
        base_url: base_url.to_string(),
        started_at,
        finished_at: Utc::now(),
        server_owned: false,
    })
}

/// Analyzes a single resolved route URL: fetch, parse, probe referenced
/// images, validate. A fetch failure becomes this route's only issue and
/// never aborts sibling work.
async fn analyze_route(
    client: &Client,
    cache: &ImageCache,
    route: RouteDescriptor,
    target: &Url,
) -> RouteAnalysis {
    match fetch_and_parse_og_metadata(client, target).await {
        Ok(metadata) => {
            let mut images = Vec::new();
            if let Some(ref raw) = metadata.image_url {
                images.push(cache.get_or_fetch(client, target, raw).await);
            }
            let issues = validate::validate_metadata(&metadata, &images);
            RouteAnalysis {
                route,
                metadata,
                images,
                issues,
                skipped: None,
            }
        }
        Err(e) => {
            warn!("Fetch failed for {}: {}", target, e);
            RouteAnalysis {
                route,
                metadata: OgMetadata::default(),
                images: Vec::new(),
                issues: vec![fetch_failed_issue(e)],
                skipped: None,
            }
        }
    }
}

/// Builds the concrete URL for a route, substituting sample values into
/// dynamic segments. A dynamic route with unresolved parameters is a
/// skip reason, not an error.
fn resolve_route_url(
    base_url: &Url,
    route: &RouteDescriptor,
    sample_params: &SampleParams,
) -> std::result::Result<Url, String> {
    let mut path = route.path.clone();

    if route.is_dynamic {
        let Some(params) = sample_params.get(&route.path) else {
            return Err(format!(
                "dynamic route needs sample values for [{}]",
                route.param_names.join(", ")
            ));
        };
        for name in &route.param_names {
            let Some(value) = params.get(name) else {
                return Err(format!("no sample value for parameter '{}'", name));
            };
            for pattern in [
                format!("[[...{}]]", name),
                format!("[...{}]", name),
                format!("[{}]", name),
            ] {
                path = path.replace(&pattern, value);
            }
        }
    }

    base_url
        .join(&path)
        .map_err(|e| format!("unresolvable route path {}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:3000/").unwrap()
    }

    #[test]
    fn resolves_static_route() {
        let route = RouteDescriptor::from_path("/about");
        let url = resolve_route_url(&base(), &route, &SampleParams::new()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/about");
    }

    #[test]
    fn resolves_dynamic_route_with_samples() {
        let route = RouteDescriptor::from_path("/blog/[slug]");
        let mut samples = SampleParams::new();
        samples.insert(
            "/blog/[slug]".to_string(),
            HashMap::from([("slug".to_string(), "hello-world".to_string())]),
        );
        let url = resolve_route_url(&base(), &route, &samples).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/blog/hello-world");
    }

    #[test]
    fn dynamic_route_without_samples_is_a_skip() {
        let route = RouteDescriptor::from_path("/blog/[slug]");
        let err = resolve_route_url(&base(), &route, &SampleParams::new()).unwrap_err();
        assert!(err.contains("slug"));
    }

    #[test]
    fn partial_samples_still_skip() {
        let route = RouteDescriptor::from_path("/docs/[section]/[page]");
        let mut samples = SampleParams::new();
        samples.insert(
            "/docs/[section]/[page]".to_string(),
            HashMap::from([("section".to_string(), "guide".to_string())]),
        );
        let err = resolve_route_url(&base(), &route, &samples).unwrap_err();
        assert!(err.contains("page"));
    }
}
