//! Per-pixel index computation
//!
//! This module turns a BGR field photograph into the scalar fields the
//! segmentation stages threshold: five normalized vegetation/residue
//! indices and the lightness/chroma channels of the residue stage.

pub mod bank;
pub mod color_space;

pub use bank::{compute_indices, normalize, IndexBank, IndexKind, IndexSet};
pub use color_space::{ColorChannels, ColorSpaceAdapter};

use opencv::{
    core::{Mat, Vec3b, CV_8U},
    prelude::*,
};

use crate::{Result, SegmentationError};

/// Check that `image` is a non-empty 8-bit, 3-channel grid
pub(crate) fn ensure_color_image(image: &Mat) -> Result<()> {
    if image.empty() {
        return Err(SegmentationError::invalid_image("image is empty"));
    }
    if image.channels() != 3 {
        return Err(SegmentationError::invalid_image(format!(
            "expected 3 channels, found {}",
            image.channels()
        )));
    }
    if image.depth() != CV_8U {
        return Err(SegmentationError::invalid_image(format!(
            "expected 8-bit channels, found depth code {}",
            image.depth()
        )));
    }
    Ok(())
}

/// `(rows, cols)` of an OpenCV matrix
pub(crate) fn mat_dims(image: &Mat) -> (usize, usize) {
    (image.rows().max(0) as usize, image.cols().max(0) as usize)
}

/// Row-major `[b, g, r]` pixels promoted to `f32`
pub(crate) fn bgr_pixels(image: &Mat) -> Result<Vec<[f32; 3]>> {
    ensure_color_image(image)?;

    let mut pixels = Vec::with_capacity((image.rows() * image.cols()) as usize);
    for row in 0..image.rows() {
        for col in 0..image.cols() {
            let px = image
                .at_2d::<Vec3b>(row, col)
                .map_err(|e| SegmentationError::opencv("pixel access", e))?;
            pixels.push([px[0] as f32, px[1] as f32, px[2] as f32]);
        }
    }
    Ok(pixels)
}
