//! Per-mode stage options.

use crate::core::Mode;

/// A value chosen by [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByMode<T> {
    pub development: T,
    pub production: T,
}

impl<T: Clone> ByMode<T> {
    pub fn new(development: T, production: T) -> Self {
        Self {
            development,
            production,
        }
    }

    /// Same value in both modes.
    pub fn same(value: T) -> Self {
        Self {
            development: value.clone(),
            production: value,
        }
    }

    pub fn get(&self, mode: Mode) -> &T {
        match mode {
            Mode::Development => &self.development,
            Mode::Production => &self.production,
        }
    }
}

/// Options handed to a transform, one variant per transform family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOptions {
    /// Byte-for-byte copy.
    Copy,
    Images(ImageOptions),
    Html(HtmlOptions),
    Css(CssOptions),
    Sass(SassOptions),
    Javascript(JsOptions),
    Sprites(SpriteOptions),
    Lint(LintOptions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Recompress PNGs losslessly, keeping the smaller file.
    pub optimize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HtmlOptions {
    pub remove_comments: bool,
    pub collapse_whitespace: bool,
}

impl HtmlOptions {
    pub const fn is_passthrough(self) -> bool {
        !self.remove_comments && !self.collapse_whitespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssOptions {
    pub suffix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SassStyle {
    Expanded,
    Compressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SassOptions {
    pub style: SassStyle,
    /// Inline a sources-only map (no line mappings) in development output.
    pub source_map: bool,
    /// Browserslist queries for vendor prefixing. `None` leaves the CSS as
    /// compiled.
    pub browsers: Option<Vec<String>>,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsOptions {
    /// Inline source map in the bundle.
    pub debug: bool,
    /// Define `global`, `process`, `__filename`, `__dirname` for modules.
    pub insert_globals: bool,
    pub minify: bool,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteOptions {
    /// Prefix of each `<symbol>` id.
    pub item_prefix: String,
    /// Prefix of the sheet file name.
    pub sheet_prefix: String,
    pub keep_view_box: bool,
    /// Emit a sheet meant for inlining into HTML (no XML prolog).
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintOptions {
    pub fail_on_error: bool,
}
