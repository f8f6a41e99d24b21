use crate::error::{AnalyzeError, Result};
use crate::server::validate_next_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

const PAGE_EXTENSIONS: [&str; 5] = ["js", "jsx", "ts", "tsx", "mdx"];

/// Reserved pages-router modules that never map to a servable route.
const PAGES_SPECIAL: [&str; 3] = ["_app", "_document", "_error"];

/// Error-convention pages excluded from crawling.
const ERROR_PAGES: [&str; 3] = ["/404", "/500", "/_not-found"];

/// A single servable route of the target application.
///
/// `path` is normalized (leading slash, no trailing slash except root) and
/// unique within a discovery result. Dynamic segments are recorded, never
/// expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub path: String,
    pub is_dynamic: bool,
    pub param_names: Vec<String>,
}

impl RouteDescriptor {
    /// Builds a descriptor from a URL path, extracting `[param]`,
    /// `[...param]` and `[[...param]]` segment names.
    pub fn from_path(path: &str) -> Self {
        let path = normalize_path(path);
        let param_names: Vec<String> = path
            .split('/')
            .filter_map(parse_param_segment)
            .collect();

        Self {
            is_dynamic: !param_names.is_empty(),
            param_names,
            path,
        }
    }
}

fn parse_param_segment(segment: &str) -> Option<String> {
    let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
    // Optional catch-all [[...name]] then catch-all [...name].
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(inner);
    let inner = inner.strip_prefix("...").unwrap_or(inner);
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Discovery strategy for one target framework.
///
/// The orchestrator only sees this trait, so a different framework's
/// discovery can be swapped in without touching the pipeline.
pub trait RouteSource: Send + Sync {
    fn discover(&self, app_root: &Path) -> Result<Vec<RouteDescriptor>>;
}

/// Next.js discovery: build manifests first, page-definition directory
/// walk when no manifest exists.
pub struct NextRoutes;

impl RouteSource for NextRoutes {
    fn discover(&self, app_root: &Path) -> Result<Vec<RouteDescriptor>> {
        if !validate_next_dir(app_root) {
            return Err(AnalyzeError::RouteDiscovery(format!(
                "{} is not a Next.js application root",
                app_root.display()
            )));
        }

        let mut paths = read_manifest_routes(app_root);
        if paths.is_empty() {
            debug!("No build manifest routes, walking page definitions");
            paths = walk_app_dir(app_root);
            paths.extend(walk_pages_dir(app_root));
        }

        // BTreeMap gives both the uniqueness invariant and a stable order.
        let mut routes: BTreeMap<String, RouteDescriptor> = BTreeMap::new();
        for path in paths {
            if ERROR_PAGES.contains(&path.as_str()) || path.starts_with("/api/") || path == "/api" {
                continue;
            }
            let descriptor = RouteDescriptor::from_path(&path);
            routes.entry(descriptor.path.clone()).or_insert(descriptor);
        }

        info!("Discovered {} routes in {}", routes.len(), app_root.display());
        Ok(routes.into_values().collect())
    }
}

/// Discovers routes using the default Next.js strategy.
pub fn discover_routes(app_root: &Path) -> Result<Vec<RouteDescriptor>> {
    NextRoutes.discover(app_root)
}

#[derive(Deserialize)]
struct RoutesManifest {
    #[serde(default, rename = "staticRoutes")]
    static_routes: Vec<ManifestRoute>,
    #[serde(default, rename = "dynamicRoutes")]
    dynamic_routes: Vec<ManifestRoute>,
}

#[derive(Deserialize)]
struct ManifestRoute {
    page: String,
}

fn read_manifest_routes(app_root: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    let build_dir = app_root.join(".next");

    // App router: keys are "<route>/page" or "<route>/route" module paths,
    // values the URL paths. Only page modules are crawlable.
    let app_manifest = build_dir.join("app-path-routes-manifest.json");
    if let Ok(contents) = std::fs::read_to_string(&app_manifest)
        && let Ok(entries) = serde_json::from_str::<BTreeMap<String, String>>(&contents)
    {
        for (module, url_path) in entries {
            if module.ends_with("/page") || module == "/page" {
                paths.push(url_path);
            }
        }
    }

    let routes_manifest = build_dir.join("routes-manifest.json");
    if let Ok(contents) = std::fs::read_to_string(&routes_manifest)
        && let Ok(manifest) = serde_json::from_str::<RoutesManifest>(&contents)
    {
        for route in manifest
            .static_routes
            .into_iter()
            .chain(manifest.dynamic_routes)
        {
            paths.push(route.page);
        }
    }

    paths
}

fn page_dir(app_root: &Path, name: &str) -> Option<std::path::PathBuf> {
    for candidate in [app_root.join(name), app_root.join("src").join(name)] {
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    None
}

fn has_page_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PAGE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// App-router walk: every `page.*` file maps to the route of its
/// directory. Route groups `(group)` are elided from the URL; parallel
/// route slots `@name` and private `_name` segments never produce routes.
fn walk_app_dir(app_root: &Path) -> Vec<String> {
    let Some(app_dir) = page_dir(app_root, "app") else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(&app_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !has_page_extension(entry.path()) {
            continue;
        }
        let stem = entry
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if stem != "page" {
            continue;
        }

        let Ok(relative) = entry.path().parent().unwrap_or(&app_dir).strip_prefix(&app_dir) else {
            continue;
        };

        let mut segments = Vec::new();
        let mut excluded = false;
        for component in relative.components() {
            let segment = component.as_os_str().to_string_lossy();
            if segment.starts_with('(') && segment.ends_with(')') {
                continue;
            }
            if segment.starts_with('@') || segment.starts_with('_') {
                excluded = true;
                break;
            }
            segments.push(segment.to_string());
        }
        if excluded {
            continue;
        }

        paths.push(format!("/{}", segments.join("/")));
    }

    paths
}

/// Pages-router walk: every page module maps to its file path, with
/// `index` collapsing to the directory route. The `api/` subtree and the
/// reserved `_app`/`_document`/`_error` modules are not crawlable pages.
fn walk_pages_dir(app_root: &Path) -> Vec<String> {
    let Some(pages_dir) = page_dir(app_root, "pages") else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(&pages_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !has_page_extension(entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&pages_dir) else {
            continue;
        };
        if relative.starts_with("api") {
            continue;
        }

        let stem = entry
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if PAGES_SPECIAL.contains(&stem) {
            continue;
        }

        let parent = relative
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        let route = if stem == "index" {
            format!("/{}", parent)
        } else if parent.is_empty() {
            format!("/{}", stem)
        } else {
            format!("/{}/{}", parent, stem)
        };

        paths.push(route);
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export default function Page() {}").unwrap();
    }

    fn next_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("next.config.js"), "module.exports = {}").unwrap();
        dir
    }

    #[test]
    fn rejects_non_next_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_routes(dir.path()).unwrap_err();
        assert!(matches!(err, AnalyzeError::RouteDiscovery(_)));
    }

    #[test]
    fn descriptor_parses_dynamic_segments() {
        let route = RouteDescriptor::from_path("/blog/[slug]");
        assert!(route.is_dynamic);
        assert_eq!(route.param_names, vec!["slug"]);

        let catch_all = RouteDescriptor::from_path("/docs/[...parts]");
        assert_eq!(catch_all.param_names, vec!["parts"]);

        let optional = RouteDescriptor::from_path("/shop/[[...filters]]");
        assert_eq!(optional.param_names, vec!["filters"]);

        let static_route = RouteDescriptor::from_path("/about");
        assert!(!static_route.is_dynamic);
        assert!(static_route.param_names.is_empty());
    }

    #[test]
    fn walks_app_router_pages() {
        let dir = next_root();
        touch(&dir.path().join("app/page.tsx"));
        touch(&dir.path().join("app/about/page.tsx"));
        touch(&dir.path().join("app/blog/[slug]/page.tsx"));
        touch(&dir.path().join("app/about/layout.tsx"));
        touch(&dir.path().join("app/about/loading.tsx"));

        let routes = discover_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/about", "/blog/[slug]"]);
        assert!(routes[2].is_dynamic);
    }

    #[test]
    fn elides_route_groups_and_skips_slots() {
        let dir = next_root();
        touch(&dir.path().join("app/(marketing)/pricing/page.tsx"));
        touch(&dir.path().join("app/@modal/photo/page.tsx"));
        touch(&dir.path().join("app/_internal/tools/page.tsx"));

        let routes = discover_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/pricing"]);
    }

    #[test]
    fn walks_pages_router_and_excludes_api() {
        let dir = next_root();
        touch(&dir.path().join("pages/index.tsx"));
        touch(&dir.path().join("pages/contact.tsx"));
        touch(&dir.path().join("pages/posts/[id].tsx"));
        touch(&dir.path().join("pages/api/health.ts"));
        touch(&dir.path().join("pages/_app.tsx"));
        touch(&dir.path().join("pages/_document.tsx"));

        let routes = discover_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/contact", "/posts/[id]"]);
    }

    #[test]
    fn prefers_build_manifest_over_walk() {
        let dir = next_root();
        fs::create_dir_all(dir.path().join(".next")).unwrap();
        fs::write(
            dir.path().join(".next/routes-manifest.json"),
            r#"{
                "staticRoutes": [
                    {"page": "/", "regex": "^/$"},
                    {"page": "/about", "regex": "^/about$"},
                    {"page": "/404", "regex": "^/404$"}
                ],
                "dynamicRoutes": [
                    {"page": "/blog/[slug]", "regex": "^/blog/([^/]+?)$"}
                ]
            }"#,
        )
        .unwrap();
        // Walk would find this, the manifest must win.
        touch(&dir.path().join("app/ignored/page.tsx"));

        let routes = discover_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/about", "/blog/[slug]"]);
    }

    #[test]
    fn app_manifest_keeps_pages_drops_route_handlers() {
        let dir = next_root();
        fs::create_dir_all(dir.path().join(".next")).unwrap();
        fs::write(
            dir.path().join(".next/app-path-routes-manifest.json"),
            r#"{
                "/page": "/",
                "/docs/[slug]/page": "/docs/[slug]",
                "/api/og/route": "/api/og"
            }"#,
        )
        .unwrap();

        let routes = discover_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/docs/[slug]"]);
    }

    #[test]
    fn discovery_is_deduplicated_and_stable() {
        let dir = next_root();
        touch(&dir.path().join("app/page.tsx"));
        touch(&dir.path().join("app/a/page.tsx"));
        touch(&dir.path().join("app/b/page.tsx"));
        touch(&dir.path().join("pages/a.tsx"));

        let first = discover_routes(dir.path()).unwrap();
        let second = discover_routes(dir.path()).unwrap();
        assert_eq!(first, second);

        let mut paths: Vec<&str> = first.iter().map(|r| r.path.as_str()).collect();
        let before = paths.clone();
        paths.dedup();
        assert_eq!(paths, before);
    }
}
