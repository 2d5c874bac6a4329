//! `[paths]` section: source and output roots.
//!
//! ```toml
//! [paths]
//! source = "src"    # views/, assets/ live here
//! output = "dist"   # removed and rebuilt by production runs
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub source: PathBuf,
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("src"),
            output: PathBuf::from("dist"),
        }
    }
}
