//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find a config file by searching upward from `start`.
///
/// ```text
/// /home/user/site/src/assets/   <- start
/// /home/user/site/sapl.toml     <- found
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("src/assets/js");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("sapl.toml"), "").unwrap();

        let found = find_config_file(&nested, Path::new("sapl.toml")).unwrap();
        assert_eq!(found, dir.path().join("sapl.toml"));
    }

    #[test]
    fn test_find_config_missing() {
        let dir = TempDir::new().unwrap();
        assert!(find_config_file(dir.path(), Path::new("does-not-exist.toml")).is_none());
    }
}
