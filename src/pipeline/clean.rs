//! Output directory removal.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::CleanError;
use crate::debug;

/// Delete `dir` and everything below it. A missing directory is already clean.
pub fn clean_output(dir: &Path) -> Result<(), CleanError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!("clean"; "removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanError {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
