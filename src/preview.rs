//! Quick-look preview images of the BOLD volume.
//!
//! One mid-volume slice per spatial axis, taken from the first frame,
//! normalized to `[0, PREVIEW_SCALE]` and written as 8-bit grayscale PNG.

use crate::error::Result;
use crate::nifti::NiftiImage;
use crate::report::ValidationReport;
use image::{GrayImage, ImageFormat, Luma};
use ndarray::{Array2, Axis};
use std::path::{Path, PathBuf};

/// Upper bound of the normalized intensity range.
pub const PREVIEW_SCALE: f64 = 500.0;

/// File stems of the previews, indexed by the axis the slice is taken across.
pub const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

/// Midpoint index along each spatial axis.
pub fn mid_indices(shape: &[usize]) -> [usize; 3] {
    std::array::from_fn(|axis| shape.get(axis).map_or(0, |&n| n / 2))
}

/// Shift a slice so its minimum is 0 and scale its maximum to `PREVIEW_SCALE`.
///
/// Returns `None` when the slice has no usable intensity range (constant,
/// all-NaN or unbounded).
pub fn normalize(slice: &Array2<f64>) -> Option<Array2<f64>> {
    let min = slice.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted = slice.mapv(|v| v - min);
    let max = shifted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max.is_finite() && max > 0.0) {
        return None;
    }
    Some(shifted.mapv(|v| v / max * PREVIEW_SCALE))
}

/// Transpose, then flip vertically, so the first slice axis runs left to
/// right and the second runs bottom to top.
pub fn orient(slice: Array2<f64>) -> Array2<f64> {
    let mut oriented = slice.reversed_axes();
    oriented.invert_axis(Axis(0));
    oriented
}

/// Map a normalized slice onto 8-bit grayscale; rows become image rows.
pub fn to_gray(slice: &Array2<f64>) -> GrayImage {
    let (rows, cols) = slice.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = slice[[y as usize, x as usize]] * 255.0 / PREVIEW_SCALE;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Render the x, y and z previews of `image` into `dir`.
///
/// A slice without intensity range is written blank and recorded as a
/// warning. Returns the written paths in axis order.
pub fn render_previews(
    image: &NiftiImage,
    dir: &Path,
    report: &mut ValidationReport,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mids = mid_indices(&image.shape());

    let mut written = Vec::with_capacity(3);
    for (axis, name) in AXIS_NAMES.iter().enumerate() {
        let slice = image.slice(axis, mids[axis], 0)?;
        let normalized = normalize(&slice).unwrap_or_else(|| {
            report.warning(format!("{} preview slice has constant intensity", name));
            Array2::zeros(slice.dim())
        });

        let path = dir.join(format!("{}.png", name));
        to_gray(&orient(normalized)).save_with_format(&path, ImageFormat::Png)?;
        tracing::debug!(path = %path.display(), "wrote preview");
        written.push(path);
    }
    Ok(written)
}
