//! Desaturated icon variants for taskbar theming.
//!
//! Variants are derived files outside the cache: the generator writes them
//! next to each other in the variants directory and never tracks or deletes
//! them.

use crate::cache::atomic_write_png;
use crate::error::{IconError, Result};
use crate::fingerprint::short_hash;
use crate::grid::load_icon;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VariantGenerator {
    variants_dir: PathBuf,
}

impl VariantGenerator {
    pub fn new(variants_dir: impl Into<PathBuf>) -> Self {
        Self {
            variants_dir: variants_dir.into(),
        }
    }

    /// Where the grayscale variant of `source` is written.
    ///
    /// Named after the source stem plus a hash of its full path, so sources
    /// with the same file name in different folders don't collide.
    pub fn variant_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "icon".to_string());
        let mut tag = short_hash(source.to_string_lossy().as_bytes());
        tag.truncate(8);
        self.variants_dir.join(format!("{}-{}-gray.png", stem, tag))
    }

    /// Decode `source`, desaturate every pixel and write the result as PNG.
    pub fn make_grayscale(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(IconError::ReferentNotFound(source.display().to_string()));
        }
        let image = load_icon(source)?.to_rgba8();
        let target = self.variant_path(source);
        atomic_write_png(&target, &desaturate(&image))?;
        debug!("Wrote grayscale variant {}", target.display());
        Ok(target)
    }
}

/// Rec. 601 luma in integer arithmetic; alpha is preserved.
pub fn desaturate(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
        let luma = luma.min(255) as u8;
        *pixel = Rgba([luma, luma, luma, a]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_desaturate_preserves_alpha_and_greys() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([128, 128, 128, 40]));
        image.put_pixel(2, 0, Rgba([255, 255, 255, 0]));

        let gray = desaturate(&image);
        assert_eq!(gray.get_pixel(0, 0).0, [76, 76, 76, 255]);
        assert_eq!(gray.get_pixel(1, 0).0, [128, 128, 128, 40]);
        assert_eq!(gray.get_pixel(2, 0).0, [255, 255, 255, 0]);
    }

    #[test]
    fn test_make_grayscale_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.png");
        atomic_write_png(&source, &RgbaImage::from_pixel(8, 8, Rgba([10, 200, 30, 255]))).unwrap();
        let generator = VariantGenerator::new(temp_dir.path().join("variants"));

        let first = generator.make_grayscale(&source).unwrap();
        let bytes = std::fs::read(&first).unwrap();
        let second = generator.make_grayscale(&source).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), bytes);
        let file_name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("app-") && file_name.ends_with("-gray.png"));

        let pixel = image::open(&first).unwrap().to_rgba8().get_pixel(0, 0).0;
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let generator = VariantGenerator::new(temp_dir.path());
        let err = generator
            .make_grayscale(&temp_dir.path().join("nope.png"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
