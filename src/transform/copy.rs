//! Pass-through copy.

use super::{Artifact, StageJob, StageOutput, Transform};

pub struct CopyTransform;

impl Transform for CopyTransform {
    fn apply(&self, job: &StageJob<'_>) -> anyhow::Result<StageOutput> {
        Ok(StageOutput {
            artifacts: job
                .files
                .iter()
                .map(|file| Artifact::copy(&file.relative, &file.path))
                .collect(),
            ..StageOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{StageId, StageOptions};
    use crate::transform::Contents;
    use crate::utils::glob::SourceFile;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_copy_keeps_relative_paths() {
        let files = [SourceFile {
            path: PathBuf::from("/p/src/assets/fonts/icons.woff2"),
            relative: PathBuf::from("icons.woff2"),
        }];
        let job = StageJob {
            stage: StageId::Fonts,
            files: &files,
            output_dir: Some(Path::new("/p/dist/fonts")),
            options: &StageOptions::Copy,
            root: Path::new("/p"),
        };
        let output = CopyTransform.apply(&job).unwrap();
        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].path, PathBuf::from("icons.woff2"));
        assert_eq!(
            output.artifacts[0].contents,
            Contents::Copy(PathBuf::from("/p/src/assets/fonts/icons.woff2"))
        );
    }
}
