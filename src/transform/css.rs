//! Plain CSS minification.
//!
//! Every input is minified. A file whose stem already carries the suffix
//! (`normalize.min.css`) keeps its name instead of becoming
//! `normalize.min.min.css`.

use lightningcss::targets::Targets;

use super::minify::minify_css;
use super::{Artifact, StageJob, StageOutput, Transform, map_files, read_source, renamed};
use crate::stage::StageOptions;

pub struct CssTransform;

impl Transform for CssTransform {
    fn apply(&self, job: &StageJob<'_>) -> anyhow::Result<StageOutput> {
        let StageOptions::Css(options) = job.options else {
            return Err(job.options_mismatch());
        };

        Ok(map_files(job.files, |file| {
            let source = read_source(file)?;
            let minified = minify_css(&source, Targets::default())?;
            let suffix = if has_suffix(&file.relative, &options.suffix) {
                ""
            } else {
                options.suffix.as_str()
            };
            Ok(Some(Artifact::bytes(
                renamed(&file.relative, suffix, "css"),
                minified,
            )))
        }))
    }
}

fn has_suffix(path: &std::path::Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{CssOptions, StageId};
    use crate::utils::glob::SourceFile;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn run(dir: &Path, names: &[&str]) -> StageOutput {
        let files: Vec<_> = names
            .iter()
            .map(|n| SourceFile {
                path: dir.join(n),
                relative: PathBuf::from(n),
            })
            .collect();
        let options = StageOptions::Css(CssOptions {
            suffix: ".min".into(),
        });
        let job = StageJob {
            stage: StageId::Css,
            files: &files,
            output_dir: Some(dir),
            options: &options,
            root: dir,
        };
        CssTransform.apply(&job).unwrap()
    }

    #[test]
    fn test_css_minified_with_suffix() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("reset.css"), "body {\n  margin: 0px;\n}\n").unwrap();

        let output = run(dir.path(), &["reset.css"]);
        assert_eq!(
            output.artifacts,
            vec![Artifact::bytes("reset.min.css", "body{margin:0}")]
        );
    }

    #[test]
    fn test_suffixed_input_is_minified_under_its_name() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("normalize.min.css"),
            "a {\n  color: #ff0000;\n}\n",
        )
        .unwrap();

        let output = run(dir.path(), &["normalize.min.css"]);
        assert_eq!(
            output.artifacts,
            vec![Artifact::bytes("normalize.min.css", "a{color:red}")]
        );
    }

    #[test]
    fn test_invalid_css_fails_only_that_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.css"), "a { color: blue }").unwrap();
        fs::write(dir.path().join("worse.css"), ":::nope { color: red }").unwrap();

        let output = run(dir.path(), &["good.css", "worse.css"]);
        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].path, PathBuf::from("good.min.css"));
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].path, PathBuf::from("worse.css"));
    }
}
