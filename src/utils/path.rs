//! Path helpers.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first, then falls back to joining relative paths
/// onto the current directory (the path may not exist yet).
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Display `path` relative to `root` when possible.
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Join a config-relative path onto the root. Absolute paths pass through.
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("relative/path/file.txt"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/p/src/app.js"), Path::new("/p")),
            "src/app.js"
        );
        assert_eq!(
            display_relative(Path::new("/other/app.js"), Path::new("/p")),
            "/other/app.js"
        );
    }

    #[test]
    fn test_resolve_under() {
        assert_eq!(
            resolve_under(Path::new("/p"), Path::new("dist")),
            PathBuf::from("/p/dist")
        );
        assert_eq!(
            resolve_under(Path::new("/p"), Path::new("/abs/dist")),
            PathBuf::from("/abs/dist")
        );
    }
}
