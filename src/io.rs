//! Loading and saving of images and projection data
//!
//! Arrays travel as `.npy` files, the interchange format of the
//! surrounding tooling; reconstructed images are additionally rendered as
//! 8-bit grayscale PNGs for quick inspection.

use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use ndarray::prelude::*;
use ndarray_npy::{read_npy, write_npy};

pub fn load_array2(path: &Path) -> Result<Array2<f32>> {
    read_npy(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn save_array2(path: &Path, data: &Array2<f32>) -> Result<()> {
    write_npy(path, data).with_context(|| format!("failed to write {}", path.display()))
}

/// Scale factor mapping pixel values onto `[0, 255]`.
///
/// An all-zero image gets factor 1 rather than a division by zero.
pub fn gray_scale_factor(image: ArrayView2<f32>) -> f32 {
    let max = image.fold(0.0f32, |m, &v| m.max(v));
    if max > 0.0 {
        255.0 / max
    } else {
        1.0
    }
}

/// Render an image as an 8-bit grayscale PNG, scaled by
/// [`gray_scale_factor`] and clamped to the valid range.
pub fn save_png(path: &Path, image: ArrayView2<f32>) -> Result<()> {
    let (h, w) = image.dim();
    let scale = gray_scale_factor(image);
    let mut png = GrayImage::new(w as u32, h as u32);
    for ((i, j), &v) in image.indexed_iter() {
        png.put_pixel(j as u32, i as u32, Luma([(v * scale).clamp(0.0, 255.0) as u8]));
    }
    png.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn npy_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("recon.npy");

        let original = array![[1.25f32, -0.5], [0.0, 3.75]];
        save_array2(&path, &original)?;
        let restored = load_array2(&path)?;

        assert_abs_diff_eq!(original, restored);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_array2(Path::new("does/not/exist.npy")).is_err());
    }

    #[test]
    fn zero_image_scales_by_one() {
        let zeros = Array2::<f32>::zeros((4, 4));
        assert_eq!(gray_scale_factor(zeros.view()), 1.0);
    }

    #[test]
    fn scale_maps_max_to_255() {
        let img = array![[0.0f32, 2.0], [1.0, 0.5]];
        assert_eq!(gray_scale_factor(img.view()), 127.5);
    }

    #[test]
    fn png_roundtrip_preserves_extremes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("recon.png");

        let img = array![[0.0f32, 4.0], [2.0, 0.0]];
        save_png(&path, img.view())?;

        let png = image::open(&path)?.to_luma8();
        assert_eq!(png.dimensions(), (2, 2));
        assert_eq!(png.get_pixel(0, 0).0[0], 0);
        assert_eq!(png.get_pixel(1, 0).0[0], 255);
        assert_eq!(png.get_pixel(0, 1).0[0], 127);
        Ok(())
    }

    #[test]
    fn all_zero_image_renders_without_panicking() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("zeros.png");
        save_png(&path, Array2::<f32>::zeros((8, 8)).view())?;

        let png = image::open(&path)?.to_luma8();
        assert!(png.pixels().all(|p| p.0[0] == 0));
        Ok(())
    }
}
