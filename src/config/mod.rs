//! Project configuration management for `sapl.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── assets     # [sass], [images]
//! │   ├── paths      # [paths]
//! │   └── serve      # [serve]
//! ├── error.rs       # ConfigError
//! ├── util.rs        # config file lookup
//! └── mod.rs         # SiteConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section            | Purpose                                      |
//! |--------------------|----------------------------------------------|
//! | `[paths]`          | Source and output roots                      |
//! | `[serve]`          | Development server (interface, ports, routes)|
//! | `[sass]`           | Vendor prefix targets                        |
//! | `[images]`         | PNG recompression toggle                     |
//!
//! The file is optional: without one the defaults reproduce the conventional
//! `src/` -> `dist/` layout.

pub mod section;
mod error;
mod util;

pub use error::ConfigError;
pub use section::{ImagesConfig, PathsConfig, SassConfig, ServeConfig};

use util::find_config_file;

use crate::cli::Cli;
use crate::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Root configuration structure representing sapl.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root directory (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub sass: SassConfig,

    #[serde(default)]
    pub images: ImagesConfig,
}

impl SiteConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from `--root` (or the working directory) for the config
    /// file. When found, its parent becomes the project root; otherwise the
    /// start directory is the root and defaults apply.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let start = match &cli.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()
                .map_err(|e| ConfigError::Io(PathBuf::from("."), e))?,
        };
        let start = start
            .canonicalize()
            .map_err(|e| ConfigError::Io(start.clone(), e))?;

        let (mut config, root) = match find_config_file(&start, &cli.config) {
            Some(path) => {
                debug!("config"; "using {}", path.display());
                let mut config = Self::from_path(&path)?;
                let root = path.parent().map_or_else(|| start.clone(), Path::to_path_buf);
                config.config_path = Some(path);
                (config, root)
            }
            None => {
                debug!("config"; "no {} found, using defaults", cli.config.display());
                (Self::default(), start)
            }
        };

        config.root = root;
        config.apply_cli_options(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_str(&content)
    }

    fn apply_cli_options(&mut self, cli: &Cli) {
        Self::update_option(&mut self.serve.interface, cli.interface.as_ref());
        Self::update_option(&mut self.serve.port, cli.port.as_ref());
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Absolute output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.root_join(&self.paths.output)
    }

    /// Output subdirectory, absolute.
    pub fn output_join(&self, sub: &str) -> PathBuf {
        if sub.is_empty() {
            self.output_dir()
        } else {
            self.output_dir().join(sub)
        }
    }

    /// Glob pattern below the source directory, relative to the root.
    ///
    /// `source_pattern("views/*.html")` -> `"src/views/*.html"`
    pub fn source_pattern(&self, rel: &str) -> String {
        let source = lexical(&self.paths.source)
            .to_string_lossy()
            .replace('\\', "/");
        if source.is_empty() {
            rel.to_string()
        } else {
            format!("{source}/{rel}")
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::validate_relative("paths.output", &self.paths.output)?;
        Self::validate_relative("paths.source", &self.paths.source)?;

        let output = lexical(&self.paths.output);
        let source = lexical(&self.paths.source);
        if output.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "[paths] output must not be the project root".into(),
            ));
        }
        if source.starts_with(&output) || output.starts_with(&source) {
            return Err(ConfigError::Validation(format!(
                "[paths] output `{}` and source `{}` must not contain each other",
                self.paths.output.display(),
                self.paths.source.display()
            )));
        }

        if self.serve.port == self.serve.ws_port {
            return Err(ConfigError::Validation(format!(
                "[serve] port and ws_port are both {}",
                self.serve.port
            )));
        }

        for (prefix, dir) in &self.serve.routes {
            if !prefix.starts_with('/') || prefix.len() < 2 {
                return Err(ConfigError::Validation(format!(
                    "[serve.routes] prefix `{prefix}` must start with `/` and name a path"
                )));
            }
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "[serve.routes] `{prefix}` maps to an empty directory"
                )));
            }
        }

        Ok(())
    }

    /// Paths must stay below the root: clean deletes the output tree.
    fn validate_relative(field: &str, path: &Path) -> Result<(), ConfigError> {
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(ConfigError::Validation(format!(
                "`{field}` must be a path inside the project root, got `{}`",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Drop `.` components.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Parse a config snippet, panicking on error. Test helper.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SiteConfig {
    SiteConfig::from_str(content).unwrap()
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sapl"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = SiteConfig::from_str("[paths\nsource = 1");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(SiteConfig::from_str("[paths]\nsrc = \"x\"").is_err());
        assert!(SiteConfig::from_str("[unknown]\nkey = 1").is_err());
    }

    #[test]
    fn test_defaults_validate() {
        let config = test_parse_config("");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_pattern() {
        let config = test_parse_config("");
        assert_eq!(config.source_pattern("views/*.html"), "src/views/*.html");

        let config = test_parse_config("[paths]\nsource = \"./front/\"");
        assert_eq!(config.source_pattern("views/*.html"), "front/views/*.html");

        let config = test_parse_config("[paths]\nsource = \".\"\noutput = \"public\"");
        assert_eq!(config.source_pattern("views/*.html"), "views/*.html");
    }

    #[test]
    fn test_validate_output_is_root() {
        let config = test_parse_config("[paths]\noutput = \".\"");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_output_escapes_root() {
        let config = test_parse_config("[paths]\noutput = \"../dist\"");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = test_parse_config("[paths]\noutput = \"/tmp/dist\"");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_output_inside_source() {
        let config = test_parse_config("[paths]\nsource = \"src\"\noutput = \"src/dist\"");
        assert!(config.validate().is_err());

        let config = test_parse_config("[paths]\nsource = \".\"\noutput = \"dist\"");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_port_collision() {
        let config = test_parse_config("[serve]\nport = 4000\nws_port = 4000");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_route_prefix() {
        let config = test_parse_config("[serve.routes]\n\"vendor\" = \"node_modules\"");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let cli = cli(&["--root", root.to_str().unwrap(), "-C", "missing-sapl.toml"]);

        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.root, root);
        assert!(config.config_path.is_none());
        assert_eq!(config.output_dir(), root.join("dist"));
    }

    #[test]
    fn test_load_finds_config_upward() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("sapl.toml"), "[paths]\noutput = \"public\"").unwrap();
        let nested = root.join("src/assets");
        fs::create_dir_all(&nested).unwrap();

        let cli = cli(&["--root", nested.to_str().unwrap()]);
        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.root, root);
        assert_eq!(config.output_dir(), root.join("public"));
        assert_eq!(config.output_join("css"), root.join("public/css"));
    }

    #[test]
    fn test_load_applies_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("sapl.toml"), "[serve]\nport = 4000").unwrap();

        let cli = cli(&[
            "--root",
            root.to_str().unwrap(),
            "--port",
            "5000",
            "--interface",
            "0.0.0.0",
        ]);
        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.serve.port, 5000);
        assert_eq!(config.serve.interface.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("sapl.toml"), "[paths]\noutput = \"..\"").unwrap();

        let cli = cli(&["--root", root.to_str().unwrap()]);
        assert!(matches!(
            SiteConfig::load(&cli),
            Err(ConfigError::Validation(_))
        ));
    }
}
