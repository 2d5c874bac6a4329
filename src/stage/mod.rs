//! Named pipeline stages.
//!
//! A stage is one independently schedulable file transformation: which files
//! it reads, where it writes, which transform it runs and with which options
//! per mode. Stages are declared once in a [`Registry`] and never mutated.

mod options;
mod registry;

pub use options::{
    ByMode, CssOptions, HtmlOptions, ImageOptions, JsOptions, LintOptions, SassOptions,
    SassStyle, SpriteOptions, StageOptions,
};
pub use registry::{Registry, ResolvedStage, UnknownStageError};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::transform::Transform;
use crate::utils::glob::Globs;

/// Stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    Html,
    Images,
    Sprites,
    Fonts,
    Videos,
    Css,
    Sass,
    Javascript,
    JavascriptVendors,
    Lint,
}

impl StageId {
    pub const ALL: [StageId; 10] = [
        Self::Html,
        Self::Images,
        Self::Sprites,
        Self::Fonts,
        Self::Videos,
        Self::Css,
        Self::Sass,
        Self::Javascript,
        Self::JavascriptVendors,
        Self::Lint,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Images => "images",
            Self::Sprites => "sprites",
            Self::Fonts => "fonts",
            Self::Videos => "videos",
            Self::Css => "css",
            Self::Sass => "sass",
            Self::Javascript => "javascript",
            Self::JavascriptVendors => "javascriptVendors",
            Self::Lint => "lint",
        }
    }

    /// Whether the stage writes into the output directory.
    ///
    /// Only producing stages depend on clean.
    pub const fn is_producing(self) -> bool {
        !matches!(self, Self::Lint)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownStageError::new(s))
    }
}

/// A registered stage.
pub struct Stage {
    pub id: StageId,
    pub inputs: Globs,
    /// `None` for stages that only inspect their inputs.
    pub output_dir: Option<PathBuf>,
    pub transform: Arc<dyn Transform>,
    pub options: ByMode<StageOptions>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("inputs", &self.inputs.patterns().collect::<Vec<_>>())
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_round_trip() {
        for id in StageId::ALL {
            assert_eq!(id.as_str().parse::<StageId>().unwrap(), id);
        }
        assert_eq!(
            "javascriptVendors".parse::<StageId>().unwrap(),
            StageId::JavascriptVendors
        );
    }

    #[test]
    fn test_unknown_name() {
        let err = "coffeescript".parse::<StageId>().unwrap_err();
        assert_eq!(err.to_string(), "unknown stage `coffeescript`");
        assert!("Javascript".parse::<StageId>().is_err());
    }

    #[test]
    fn test_only_lint_is_non_producing() {
        let non_producing: Vec<_> = StageId::ALL
            .into_iter()
            .filter(|id| !id.is_producing())
            .collect();
        assert_eq!(non_producing, vec![StageId::Lint]);
    }
}
