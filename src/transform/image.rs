//! Image copy with lossless PNG recompression.
//!
//! Only PNGs are re-encoded; everything else is copied. A recompressed file
//! replaces the original only when it is smaller, so the stage never makes an
//! image worse.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};

use super::{Artifact, StageJob, StageOutput, Transform, map_files};
use crate::debug;
use crate::stage::StageOptions;

pub struct ImageTransform;

impl Transform for ImageTransform {
    fn apply(&self, job: &StageJob<'_>) -> Result<StageOutput> {
        let StageOptions::Images(options) = job.options else {
            return Err(job.options_mismatch());
        };

        Ok(map_files(job.files, |file| {
            if !options.optimize || !is_png(&file.path) {
                return Ok(Some(Artifact::copy(&file.relative, &file.path)));
            }

            let original =
                fs::read(&file.path).with_context(|| format!("failed to read {}", file.path.display()))?;
            match recompress_png(&original) {
                Ok(smaller) if smaller.len() < original.len() => {
                    debug!(
                        "images";
                        "{}: {} -> {} bytes",
                        file.relative.display(),
                        original.len(),
                        smaller.len()
                    );
                    Ok(Some(Artifact::bytes(&file.relative, smaller)))
                }
                Ok(_) => Ok(Some(Artifact::bytes(&file.relative, original))),
                Err(e) => {
                    debug!("images"; "{}: kept as is ({:#})", file.relative.display(), e);
                    Ok(Some(Artifact::bytes(&file.relative, original)))
                }
            }
        }))
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

/// Decode and re-encode with the strongest deflate settings.
fn recompress_png(data: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Png)?;
    let mut buffer = Cursor::new(Vec::new());
    PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive)
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )?;
    Ok(buffer.into_inner())
}
