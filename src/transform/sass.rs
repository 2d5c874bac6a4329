//! Sass compilation.
//!
//! `grass` compiles each entry file; partials (`_name.scss`) are only
//! reachable through `@use`/`@import`. Production output goes through
//! lightningcss for vendor prefixing and minification, development output
//! carries an inline source map that lists the entry source and its
//! content but has no mappings: devtools can open the file, not jump to a
//! line in it.

use std::path::Path;

use anyhow::{Result, anyhow};
use lightningcss::targets::Targets;

use super::minify::{browser_targets, minify_css};
use super::sourcemap::SourceMap;
use super::{Artifact, StageJob, StageOutput, Transform, map_files, read_source, renamed};
use crate::stage::{SassOptions, SassStyle, StageOptions};
use crate::utils::glob::SourceFile;

pub struct SassTransform;

impl Transform for SassTransform {
    fn apply(&self, job: &StageJob<'_>) -> Result<StageOutput> {
        let StageOptions::Sass(options) = job.options else {
            return Err(job.options_mismatch());
        };
        let targets = match &options.browsers {
            Some(queries) => Some(browser_targets(queries)?),
            None => None,
        };

        Ok(map_files(job.files, |file| {
            if is_partial(&file.path) {
                return Ok(None);
            }
            compile(file, options, targets, job.root).map(Some)
        }))
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

fn compile(
    file: &SourceFile,
    options: &SassOptions,
    targets: Option<Targets>,
    root: &Path,
) -> Result<Artifact> {
    let style = match options.style {
        SassStyle::Expanded => grass::OutputStyle::Expanded,
        SassStyle::Compressed => grass::OutputStyle::Compressed,
    };
    let mut grass_options = grass::Options::default().style(style);
    if let Some(dir) = file.path.parent() {
        grass_options = grass_options.load_path(dir);
    }

    let mut css = grass::from_path(&file.path, &grass_options).map_err(|e| anyhow!("{e}"))?;

    if let Some(targets) = targets {
        css = minify_css(&css, targets)?;
    }

    let output = renamed(&file.relative, &options.suffix, "css");
    if options.source_map {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = file
            .path
            .strip_prefix(root)
            .unwrap_or(&file.path)
            .to_string_lossy()
            .replace('\\', "/");
        let map = SourceMap::sources_only(name, vec![(source, read_source(file)?)]);
        if !css.ends_with('\n') {
            css.push('\n');
        }
        css.push_str(&map.css_comment()?);
    }

    Ok(Artifact::bytes(output, css))
}
