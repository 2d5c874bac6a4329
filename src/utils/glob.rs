//! Input glob sets.
//!
//! A stage declares its inputs as a list of patterns relative to the project
//! root. Patterns prefixed with `!` exclude, `{a,b}` alternation is expanded
//! up front, and `**` crosses directories while `*` does not.
//!
//! ```ignore
//! let globs = Globs::new(["src/assets/js/**/*.js", "!src/assets/js/vendors/*.js"])?;
//! let files = globs.expand(root)?;
//! ```

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

#[derive(Debug, Error)]
pub enum GlobError {
    #[error("invalid glob `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("cannot read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One file matched by a glob set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the glob base, used to place the output.
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
struct CompiledGlob {
    source: String,
    pattern: Pattern,
}

impl CompiledGlob {
    fn new(source: String) -> Result<Self, GlobError> {
        let pattern = Pattern::new(&source).map_err(|e| GlobError::Pattern {
            pattern: source.clone(),
            source: e,
        })?;
        Ok(Self { source, pattern })
    }
}

/// Include/exclude pattern set, relative to a project root.
#[derive(Debug, Clone)]
pub struct Globs {
    include: Vec<CompiledGlob>,
    exclude: Vec<CompiledGlob>,
}

impl Globs {
    pub fn new<I, S>(patterns: I) -> Result<Self, GlobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref();
            let (target, body) = match raw.strip_prefix('!') {
                Some(rest) => (&mut exclude, rest),
                None => (&mut include, raw),
            };
            for expanded in expand_braces(body) {
                target.push(CompiledGlob::new(expanded)?);
            }
        }
        Ok(Self { include, exclude })
    }

    /// Include patterns after brace expansion.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(|g| g.source.as_str())
    }

    /// Whether `path` (absolute, or relative to `root`) belongs to this set.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        let rel = path.strip_prefix(root).unwrap_or(path);
        self.include
            .iter()
            .any(|g| g.pattern.matches_path_with(rel, MATCH_OPTIONS))
            && !self.is_excluded(rel)
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        self.exclude
            .iter()
            .any(|g| g.pattern.matches_path_with(rel, MATCH_OPTIONS))
    }

    /// Directories to watch for this set: the wildcard-free prefix of every
    /// include pattern.
    pub fn watch_roots(&self, root: &Path) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .include
            .iter()
            .map(|g| root.join(glob_base(&g.source)))
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }

    /// List matching files, sorted by path.
    pub fn expand(&self, root: &Path) -> Result<Vec<SourceFile>, GlobError> {
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let mut files = Vec::new();

        for glob in &self.include {
            let base = root.join(glob_base(&glob.source));
            let full = format!("{}/{}", escaped_root.trim_end_matches('/'), glob.source);
            let paths = glob::glob_with(&full, MATCH_OPTIONS).map_err(|e| GlobError::Pattern {
                pattern: full.clone(),
                source: e,
            })?;

            for entry in paths {
                let path = entry.map_err(|e| GlobError::Read {
                    path: e.path().to_path_buf(),
                    source: e.into_error(),
                })?;
                if !path.is_file() {
                    continue;
                }
                let rel_root = path.strip_prefix(root).unwrap_or(&path);
                // hidden directories reached through `**`
                if !glob.pattern.matches_path_with(rel_root, MATCH_OPTIONS) || self.is_excluded(rel_root)
                {
                    continue;
                }
                let relative = path
                    .strip_prefix(&base)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
                files.push(SourceFile { path, relative });
            }
        }

        files.sort();
        files.dedup_by(|a, b| a.path == b.path);
        Ok(files)
    }
}

/// Leading path components without wildcard characters.
pub fn glob_base(pattern: &str) -> &str {
    let mut end = 0;
    for (idx, component) in pattern.split('/').enumerate() {
        if component.contains(['*', '?', '[', '{']) {
            break;
        }
        end = if idx == 0 {
            component.len()
        } else {
            end + 1 + component.len()
        };
    }
    // A pattern without wildcards names a file: its base is the parent.
    if end == pattern.len() {
        return pattern.rsplit_once('/').map_or("", |(parent, _)| parent);
    }
    &pattern[..end]
}

/// Expand `{a,b}` alternation. Nested groups are supported.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    split_top_level(body)
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
