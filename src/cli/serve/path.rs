//! URL to filesystem path resolution.

use std::path::{Path, PathBuf};

/// A URL prefix served from a directory other than the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// `/node_modules`
    pub prefix: String,
    /// Absolute directory.
    pub dir: PathBuf,
}

/// Pick the directory serving `url` and the path left to resolve in it.
///
/// Longer prefixes win; a prefix only matches whole segments.
pub fn select_root<'a>(url: &'a str, routes: &'a [Route], output: &'a Path) -> (&'a Path, &'a str) {
    let path = url.split('?').next().unwrap_or(url);
    routes
        .iter()
        .filter_map(|route| {
            let prefix = route.prefix.trim_end_matches('/');
            let rest = path.strip_prefix(prefix)?;
            (rest.is_empty() || rest.starts_with('/')).then_some((route, rest))
        })
        .max_by_key(|(route, _)| route.prefix.len())
        .map_or((output, path), |(route, rest)| (route.dir.as_path(), rest))
}

/// Resolve URL to filesystem path, handling index.html for directories
pub fn resolve_path(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(url);

    if clean.split('/').any(|segment| segment == "..") {
        return None;
    }

    let local = serve_root.join(&clean);

    // symlinks and encoded sequences must not escape the root
    let canonical = local.canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }

    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }

    None
}

/// Normalize URL: decode, strip query string, trim slashes
fn normalize_url(url: &str) -> String {
    use percent_encoding::percent_decode_str;
    let path = url.split('?').next().unwrap_or(url);
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    decoded.trim_matches('/').to_string()
}
