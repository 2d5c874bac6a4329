//! Build mode resolution.
//!
//! The mode is read from the environment exactly once, in `main`, and then
//! passed by value to everything that builds stage options.

use std::fmt;

/// Environment variable selecting the build mode.
pub const MODE_ENV: &str = "SAPL_ENV";

/// Fallback variable, kept for projects migrating from node tooling.
pub const MODE_ENV_FALLBACK: &str = "NODE_ENV";

/// Development or production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Interpret a raw environment value.
    ///
    /// Only `production` (trimmed, any case) selects production.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the process-wide mode from `SAPL_ENV`, then `NODE_ENV`.
pub fn resolve_mode() -> Mode {
    let value = std::env::var(MODE_ENV)
        .ok()
        .or_else(|| std::env::var(MODE_ENV_FALLBACK).ok());
    Mode::from_env_value(value.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_value() {
        assert_eq!(Mode::from_env_value(Some("production")), Mode::Production);
        assert_eq!(Mode::from_env_value(Some(" Production\n")), Mode::Production);
    }

    #[test]
    fn test_defaults_to_development() {
        assert_eq!(Mode::from_env_value(None), Mode::Development);
        assert_eq!(Mode::from_env_value(Some("")), Mode::Development);
        assert_eq!(Mode::from_env_value(Some("prod")), Mode::Development);
        assert_eq!(Mode::from_env_value(Some("staging")), Mode::Development);
    }

    #[test]
    fn test_display() {
        assert_eq!(Mode::Production.to_string(), "production");
        assert!(!Mode::default().is_production());
    }
}
