//! `[sass]` and `[images]` sections.
//!
//! ```toml
//! [sass]
//! browsers = ["last 50 versions"]   # vendor-prefix targets for production
//!
//! [images]
//! optimize = true                   # lossless PNG recompression
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SassConfig {
    /// Browserslist queries used for vendor prefixing.
    pub browsers: Vec<String>,
}

impl Default for SassConfig {
    fn default() -> Self {
        Self {
            browsers: vec!["last 50 versions".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub optimize: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { optimize: true }
    }
}
