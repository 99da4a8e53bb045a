//! Lightness and chroma channels for the residue stage
//!
//! L comes from CIE L*a*b* (8-bit scaling, L*·255/100) and Cb/Cr from
//! YCrCb, both on their native 0–255 scale.

use opencv::{
    core::{AlgorithmHint, Mat, Vec3b},
    imgproc::{cvt_color, COLOR_BGR2Lab, COLOR_BGR2YCrCb},
    prelude::*,
};

use crate::grid::ScalarField;
use crate::indices::{ensure_color_image, mat_dims};
use crate::{Result, SegmentationError};

/// Perceptual lightness and chroma of one image
#[derive(Debug, Clone, PartialEq)]
pub struct ColorChannels {
    /// CIE lightness, 0–255
    pub lightness: ScalarField,
    /// Blue-difference chroma, 0–255 (128 = neutral)
    pub cb: ScalarField,
    /// Red-difference chroma, 0–255 (128 = neutral)
    pub cr: ScalarField,
}

/// Stateless BGR → (L, Cb, Cr) converter
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorSpaceAdapter;

impl ColorSpaceAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Derive the L, Cb and Cr channels of a BGR image
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` if the image is empty or not 8-bit 3-channel
    pub fn convert(&self, image: &Mat) -> Result<ColorChannels> {
        ensure_color_image(image)?;

        let lab = convert_mat(image, COLOR_BGR2Lab, "Lab conversion")?;
        let ycrcb = convert_mat(image, COLOR_BGR2YCrCb, "YCrCb conversion")?;

        Ok(ColorChannels {
            lightness: channel(&lab, 0)?,
            // YCrCb stores Cr before Cb
            cr: channel(&ycrcb, 1)?,
            cb: channel(&ycrcb, 2)?,
        })
    }
}

fn convert_mat(image: &Mat, code: i32, operation: &str) -> Result<Mat> {
    let mut out = Mat::default();
    cvt_color(image, &mut out, code, 0, AlgorithmHint::ALGO_HINT_DEFAULT)
        .map_err(|e| SegmentationError::opencv(operation, e))?;
    Ok(out)
}

fn channel(mat: &Mat, index: usize) -> Result<ScalarField> {
    let (rows, cols) = mat_dims(mat);
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..mat.rows() {
        for col in 0..mat.cols() {
            let px = mat
                .at_2d::<Vec3b>(row, col)
                .map_err(|e| SegmentationError::opencv("channel access", e))?;
            data.push(px[index] as f32);
        }
    }
    ScalarField::from_vec(rows, cols, data)
}
