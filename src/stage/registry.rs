//! Stage registry.
//!
//! Built once at startup and passed by reference. Registration is pure
//! declaration: nothing is read or written until a stage is resolved and run.
//!
//! # Standard layout
//!
//! | Stage             | Input                                      | Output            |
//! |-------------------|--------------------------------------------|-------------------|
//! | html              | `src/views/*.html`                         | `dist`            |
//! | images            | `src/assets/images/*`                      | `dist/images`     |
//! | sprites           | `src/assets/fonts/sprites/*.svg`           | `dist/fonts`      |
//! | fonts             | `src/assets/fonts/*.{eot,ttf,woff,woff2,svg}` | `dist/fonts`   |
//! | videos            | `src/assets/videos/*`                      | `dist/videos`     |
//! | css               | `src/assets/css/*.css`                     | `dist/css/vendors`|
//! | sass              | `src/assets/sass/**/*.scss`                | `dist/css`        |
//! | javascript        | `src/assets/js/*.js`                       | `dist/js`         |
//! | javascriptVendors | `src/assets/js/vendors/*.js`               | `dist/js/vendors` |
//! | lint              | `src/assets/js/**/*.js` minus vendors      | none              |

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::{
    ByMode, CssOptions, HtmlOptions, ImageOptions, JsOptions, LintOptions, SassOptions,
    SassStyle, SpriteOptions, Stage, StageId, StageOptions,
};
use crate::config::SiteConfig;
use crate::core::Mode;
use crate::transform::{
    CopyTransform, CssTransform, HtmlTransform, ImageTransform, JsBundleTransform, LintTransform,
    SassTransform, SpriteTransform, Transform,
};
use crate::utils::glob::{GlobError, Globs};

/// Stage id or name that was never registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage `{name}`")]
pub struct UnknownStageError {
    pub name: String,
}

impl UnknownStageError {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A stage with its options picked for one mode.
#[derive(Clone)]
pub struct ResolvedStage {
    pub id: StageId,
    pub inputs: Globs,
    pub output_dir: Option<PathBuf>,
    pub transform: Arc<dyn Transform>,
    pub options: StageOptions,
}

impl fmt::Debug for ResolvedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedStage")
            .field("id", &self.id)
            .field("output_dir", &self.output_dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    stages: BTreeMap<StageId, Stage>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage. A later registration of the same id replaces the
    /// earlier one.
    pub fn register(
        &mut self,
        id: StageId,
        inputs: Globs,
        output_dir: Option<PathBuf>,
        transform: Arc<dyn Transform>,
        options: ByMode<StageOptions>,
    ) -> &mut Self {
        self.stages.insert(
            id,
            Stage {
                id,
                inputs,
                output_dir,
                transform,
                options,
            },
        );
        self
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(&id)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Registered ids in declaration-independent order.
    pub fn ids(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.keys().copied()
    }

    pub fn resolve(&self, id: StageId, mode: Mode) -> Result<ResolvedStage, UnknownStageError> {
        let stage = self
            .stages
            .get(&id)
            .ok_or_else(|| UnknownStageError::new(id.as_str()))?;
        Ok(ResolvedStage {
            id,
            inputs: stage.inputs.clone(),
            output_dir: stage.output_dir.clone(),
            transform: Arc::clone(&stage.transform),
            options: stage.options.get(mode).clone(),
        })
    }

    pub fn resolve_named(&self, name: &str, mode: Mode) -> Result<ResolvedStage, UnknownStageError> {
        self.resolve(name.parse()?, mode)
    }

    /// The conventional `src/` -> `dist/` registry.
    pub fn standard(config: &SiteConfig) -> Result<Self, GlobError> {
        let src = |rel: &str| config.source_pattern(rel);
        let out = |rel: &str| Some(config.output_join(rel));
        let owned = |s: &str| s.to_string();

        let mut registry = Self::new();
        registry
            .register(
                StageId::Html,
                Globs::new([src("views/*.html")])?,
                out(""),
                Arc::new(HtmlTransform),
                ByMode::new(
                    StageOptions::Html(HtmlOptions::default()),
                    StageOptions::Html(HtmlOptions {
                        remove_comments: true,
                        collapse_whitespace: true,
                    }),
                ),
            )
            .register(
                StageId::Images,
                Globs::new([src("assets/images/*")])?,
                out("images"),
                Arc::new(ImageTransform),
                ByMode::same(StageOptions::Images(ImageOptions {
                    optimize: config.images.optimize,
                })),
            )
            .register(
                StageId::Sprites,
                Globs::new([src("assets/fonts/sprites/*.svg")])?,
                out("fonts"),
                Arc::new(SpriteTransform),
                ByMode::same(StageOptions::Sprites(SpriteOptions {
                    item_prefix: owned("si-"),
                    sheet_prefix: owned("sapl-"),
                    keep_view_box: true,
                    inline: true,
                })),
            )
            .register(
                StageId::Fonts,
                Globs::new([src("assets/fonts/*.{eot,ttf,woff,woff2,svg}")])?,
                out("fonts"),
                Arc::new(CopyTransform),
                ByMode::same(StageOptions::Copy),
            )
            .register(
                StageId::Videos,
                Globs::new([src("assets/videos/*")])?,
                out("videos"),
                Arc::new(CopyTransform),
                ByMode::same(StageOptions::Copy),
            )
            .register(
                StageId::Css,
                Globs::new([src("assets/css/*.css")])?,
                out("css/vendors"),
                Arc::new(CssTransform),
                ByMode::same(StageOptions::Css(CssOptions {
                    suffix: owned(".min"),
                })),
            )
            .register(
                StageId::Sass,
                Globs::new([src("assets/sass/**/*.scss")])?,
                out("css"),
                Arc::new(SassTransform),
                ByMode::new(
                    StageOptions::Sass(SassOptions {
                        style: SassStyle::Expanded,
                        source_map: true,
                        browsers: None,
                        suffix: owned(".min"),
                    }),
                    StageOptions::Sass(SassOptions {
                        style: SassStyle::Compressed,
                        source_map: false,
                        browsers: Some(config.sass.browsers.clone()),
                        suffix: owned(".min"),
                    }),
                ),
            )
            .register(
                StageId::Javascript,
                Globs::new([src("assets/js/*.js")])?,
                out("js"),
                Arc::new(JsBundleTransform),
                ByMode::new(
                    StageOptions::Javascript(JsOptions {
                        debug: true,
                        insert_globals: true,
                        minify: false,
                        suffix: owned(".bundle"),
                    }),
                    StageOptions::Javascript(JsOptions {
                        debug: false,
                        insert_globals: false,
                        minify: true,
                        suffix: owned(".bundle"),
                    }),
                ),
            )
            .register(
                StageId::JavascriptVendors,
                Globs::new([src("assets/js/vendors/*.js")])?,
                out("js/vendors"),
                Arc::new(CopyTransform),
                ByMode::same(StageOptions::Copy),
            )
            .register(
                StageId::Lint,
                Globs::new([src("assets/js/**/*.js"), format!("!{}", src("assets/js/vendors/*.js"))])?,
                None,
                Arc::new(LintTransform),
                ByMode::same(StageOptions::Lint(LintOptions {
                    fail_on_error: true,
                })),
            );

        Ok(registry)
    }
}
