use crate::error::{AnalyzeError, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use url::Url;

/// Poll interval for readiness probing.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Ports tried by `find_running_server` after the preferred one.
const CANDIDATE_PORTS: std::ops::RangeInclusive<u16> = 3000..=3010;

const DEFAULT_PORT: u16 = 3000;

/// Handle to the target application's server for the duration of a run.
///
/// Exactly one handle exists per analysis run. When the handle owns the
/// process (we spawned it), `shutdown` must be called before the run
/// resolves; an unowned handle points at a server someone else manages.
pub struct ServerHandle {
    base_url: Url,
    process: Option<Child>,
}

impl ServerHandle {
    pub fn running(base_url: Url) -> Self {
        Self {
            base_url,
            process: None,
        }
    }

    pub fn spawned(base_url: Url, child: Child) -> Self {
        Self {
            base_url,
            process: Some(child),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether this run is responsible for terminating the server.
    pub fn owned(&self) -> bool {
        self.process.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|c| c.id())
    }

    /// Reports the exit status if the owned process has already died.
    pub fn try_exited(&mut self) -> Option<std::process::ExitStatus> {
        self.process.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Terminate the owned process, if any. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.process.take() {
            let pid = child.id();
            match child.kill().await {
                Ok(()) => info!("Terminated server process (pid {:?})", pid),
                Err(e) => warn!("Failed to kill server process: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("base_url", &self.base_url.as_str())
            .field("owned", &self.owned())
            .finish()
    }
}

/// Checks whether `path` looks like a Next.js application root.
///
/// A root carries a `next.config.*`, a `.next` build directory, or a
/// `package.json` that declares a `next` dependency.
pub fn validate_next_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    for config in ["next.config.js", "next.config.mjs", "next.config.ts"] {
        if path.join(config).is_file() {
            return true;
        }
    }

    if path.join(".next").is_dir() {
        return true;
    }

    let package_json = path.join("package.json");
    if let Ok(contents) = std::fs::read_to_string(&package_json)
        && let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&contents)
    {
        for table in ["dependencies", "devDependencies"] {
            if manifest
                .get(table)
                .and_then(|deps| deps.get("next"))
                .is_some()
            {
                return true;
            }
        }
    }

    false
}

/// Walks from `start` up through its ancestors and returns the first
/// directory that passes `validate_next_dir`.
pub fn find_next_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if validate_next_dir(dir) {
            debug!("Found Next.js root at {}", dir.display());
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

fn probe_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(2))
        .connect_timeout(Duration::from_secs(1))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(AnalyzeError::from)
}

/// Probes candidate local ports for an already-listening server.
///
/// The preferred port is tried first, then the conventional dev range.
/// Returns an unowned handle on the first 2xx-3xx answer; never spawns
/// anything.
pub async fn find_running_server(port: Option<u16>) -> Option<ServerHandle> {
    let client = probe_client().ok()?;

    let mut candidates: Vec<u16> = Vec::new();
    if let Some(p) = port {
        candidates.push(p);
    }
    candidates.extend(CANDIDATE_PORTS.filter(|p| Some(*p) != port));

    for candidate in candidates {
        let base = format!("http://127.0.0.1:{}/", candidate);
        let url = Url::parse(&base).ok()?;
        debug!("Probing {}", url);

        if let Ok(response) = client.get(url.clone()).send().await {
            let status = response.status().as_u16();
            if (200..400).contains(&status) {
                let powered_by = response
                    .headers()
                    .get("x-powered-by")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                info!(
                    "Found running server on port {} (x-powered-by: {:?})",
                    candidate, powered_by
                );
                return Some(ServerHandle::running(url));
            }
        }
    }

    None
}

/// Spawns the production server for the application at `app_root`.
///
/// The port is deterministic: the preferred one, or 3000. The returned
/// handle owns the child process; the caller is responsible for
/// `shutdown`. The spawned server is not yet ready - follow up with
/// `wait_for_server`.
pub async fn start_server(app_root: &Path, port: Option<u16>) -> Result<ServerHandle> {
    if !validate_next_dir(app_root) {
        return Err(AnalyzeError::ServerLaunch(format!(
            "{} is not a Next.js application root",
            app_root.display()
        )));
    }

    let port = port.unwrap_or(DEFAULT_PORT);
    let base_url = Url::parse(&format!("http://127.0.0.1:{}/", port))
        .map_err(|e| AnalyzeError::InvalidUrl(e.to_string()))?;

    info!("Starting server in {} on port {}", app_root.display(), port);

    let child = Command::new("npx")
        .arg("next")
        .arg("start")
        .arg("-p")
        .arg(port.to_string())
        .current_dir(app_root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AnalyzeError::ServerLaunch(format!("failed to spawn next start: {}", e)))?;

    Ok(ServerHandle::spawned(base_url, child))
}

/// Polls `base_url` until it answers with a 2xx-3xx status or `timeout`
/// elapses.
///
/// Each attempt is a single bounded network call followed by a fixed
/// sleep; there is no busy loop.
pub async fn wait_for_server(base_url: &Url, timeout: Duration) -> Result<()> {
    let client = probe_client()?;
    let started = Instant::now();

    loop {
        match client.get(base_url.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..400).contains(&status) {
                    debug!(
                        "Server at {} ready after {:?}",
                        base_url,
                        started.elapsed()
                    );
                    return Ok(());
                }
                debug!("Server at {} answered {}", base_url, status);
            }
            Err(e) => debug!("Server at {} not answering yet: {}", base_url, e),
        }

        if started.elapsed() >= timeout {
            return Err(AnalyzeError::ServerTimeout {
                url: base_url.to_string(),
                waited: started.elapsed(),
            });
        }

        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}
