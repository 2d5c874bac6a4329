//! Content transforms.
//!
//! Every stage hands its matched files to a [`Transform`] and gets back the
//! files to write. Transforms never touch the output directory themselves:
//! the runner writes what they return, so a transform that fails on one file
//! still delivers the others.
//!
//! | Transform           | Stages                            | Backend        |
//! |---------------------|-----------------------------------|----------------|
//! | [`CopyTransform`]   | fonts, videos, javascriptVendors  | filesystem     |
//! | [`ImageTransform`]  | images                            | `image`        |
//! | [`HtmlTransform`]   | html                              | `regex`        |
//! | [`CssTransform`]    | css                               | `lightningcss` |
//! | [`SassTransform`]   | sass                              | `grass`        |
//! | [`JsBundleTransform`] | javascript                      | `oxc`          |
//! | [`SpriteTransform`] | sprites                           | `quick-xml`    |
//! | [`LintTransform`]   | lint                              | `oxc`          |

mod bundle;
mod copy;
mod css;
mod html;
mod image;
mod lint;
mod minify;
mod sass;
mod sourcemap;
mod sprite;

pub use bundle::JsBundleTransform;
pub use copy::CopyTransform;
pub use css::CssTransform;
pub use html::HtmlTransform;
pub use image::ImageTransform;
pub use lint::LintTransform;
pub use sass::SassTransform;
pub use sprite::SpriteTransform;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;

use crate::stage::{StageId, StageOptions};
use crate::utils::glob::SourceFile;

/// The library call behind a stage.
pub trait Transform: Send + Sync {
    fn apply(&self, job: &StageJob<'_>) -> anyhow::Result<StageOutput>;
}

impl<F> Transform for F
where
    F: Fn(&StageJob<'_>) -> anyhow::Result<StageOutput> + Send + Sync,
{
    fn apply(&self, job: &StageJob<'_>) -> anyhow::Result<StageOutput> {
        self(job)
    }
}

/// Input of one transform invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageJob<'a> {
    pub stage: StageId,
    pub files: &'a [SourceFile],
    pub output_dir: Option<&'a Path>,
    pub options: &'a StageOptions,
    pub root: &'a Path,
}

impl StageJob<'_> {
    /// Error for a transform handed options of another family.
    pub fn options_mismatch(&self) -> anyhow::Error {
        anyhow::anyhow!(
            "stage `{}` received unexpected options {:?}",
            self.stage,
            self.options
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    Bytes(Vec<u8>),
    /// Copy this file unchanged.
    Copy(PathBuf),
}

/// One file to write, relative to the stage output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: Contents,
}

impl Artifact {
    pub fn bytes(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Bytes(contents.into()),
        }
    }

    pub fn copy(path: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Copy(source.into()),
        }
    }
}

/// Per-file failure inside an otherwise successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Default)]
pub struct StageOutput {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<FileFailure>,
    /// Informational text shown after the stage (lint reports).
    pub notes: Vec<String>,
}

impl StageOutput {
    pub fn fail(&mut self, path: impl Into<PathBuf>, err: impl fmt::Display) {
        self.failures.push(FileFailure {
            path: path.into(),
            message: err.to_string(),
        });
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `f` over every file in parallel, keeping input order.
///
/// `Ok(None)` skips a file without output.
pub fn map_files<F>(files: &[SourceFile], f: F) -> StageOutput
where
    F: Fn(&SourceFile) -> anyhow::Result<Option<Artifact>> + Sync,
{
    let results: Vec<_> = files.par_iter().map(|file| (file, f(file))).collect();

    let mut output = StageOutput::default();
    for (file, result) in results {
        match result {
            Ok(Some(artifact)) => output.artifacts.push(artifact),
            Ok(None) => {}
            Err(e) => output.fail(&file.relative, format!("{e:#}")),
        }
    }
    output
}

/// `pages/home.scss` + `.min` + `css` -> `pages/home.min.css`
pub fn renamed(relative: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    relative.with_file_name(format!("{stem}{suffix}.{extension}"))
}

pub fn read_source(file: &SourceFile) -> anyhow::Result<String> {
    std::fs::read_to_string(&file.path)
        .with_context(|| format!("failed to read {}", file.path.display()))
}
