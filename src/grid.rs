//! Per-pixel grids produced by the pipeline
//!
//! Score fields are row-major `f32` buffers. Binary masks and label maps are
//! 8-bit single-channel OpenCV matrices (`CV_8UC1`), so they go straight into
//! the morphology and bitwise operations. Every operation returns a freshly
//! allocated grid.

use opencv::{
    core::{self, Mat, Scalar, CMP_EQ, CMP_NE, CV_8UC1},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::{Result, SegmentationError};

/// Pixel value of a set mask pixel
pub const MASK_SET: u8 = 255;

/// Agronomic cover class of a pixel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoverClass {
    /// Bare soil (code 0)
    #[default]
    Soil = 0,
    /// Straw residue (code 1)
    Straw = 1,
    /// Living plant canopy (code 2)
    Plant = 2,
}

/// Compositing order: later entries overwrite earlier ones at contested pixels
pub const COMPOSITE_ORDER: [CoverClass; 3] =
    [CoverClass::Soil, CoverClass::Straw, CoverClass::Plant];

impl CoverClass {
    /// Numeric class code stored in label maps
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a class code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CoverClass::Soil),
            1 => Some(CoverClass::Straw),
            2 => Some(CoverClass::Plant),
            _ => None,
        }
    }
}

fn check_len(rows: usize, cols: usize, len: usize) -> Result<()> {
    if rows * cols != len {
        return Err(SegmentationError::DimensionMismatch {
            expected: format!("{} values ({}x{})", rows * cols, rows, cols),
            found: format!("{} values", len),
        });
    }
    Ok(())
}

fn check_dims(expected: (usize, usize), found: (usize, usize)) -> Result<()> {
    if expected != found {
        return Err(SegmentationError::dimension_mismatch(expected, found));
    }
    Ok(())
}

fn filled_mat(rows: usize, cols: usize, value: u8) -> Result<Mat> {
    Mat::new_rows_cols_with_default(rows as i32, cols as i32, CV_8UC1, Scalar::all(value as f64))
        .map_err(|e| SegmentationError::opencv("grid allocation", e))
}

fn mat_from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Mat> {
    check_len(rows, cols, bytes.len())?;
    let mut mat = filled_mat(rows, cols, 0)?;
    if !bytes.is_empty() {
        mat.data_bytes_mut()
            .map_err(|e| SegmentationError::opencv("grid write", e))?
            .copy_from_slice(bytes);
    }
    Ok(mat)
}

/// Pixel bytes of a continuous 8-bit matrix
fn mat_bytes(mat: &Mat) -> &[u8] {
    if mat.empty() {
        return &[];
    }
    mat.data_bytes().unwrap_or_default()
}

fn mat_dims(mat: &Mat) -> (usize, usize) {
    (mat.rows().max(0) as usize, mat.cols().max(0) as usize)
}

fn ensure_single_byte(mat: &Mat, what: &str) -> Result<()> {
    if mat.typ() != CV_8UC1 {
        return Err(SegmentationError::invalid_image(format!(
            "{} must be 8-bit single-channel, found type code {}",
            what,
            mat.typ()
        )));
    }
    Ok(())
}

fn try_clone(mat: &Mat) -> Result<Mat> {
    mat.try_clone()
        .map_err(|e| SegmentationError::opencv("grid copy", e))
}

/// Floating-point value per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl ScalarField {
    /// Wrap row-major values
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `data.len() != rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        check_len(rows, cols, data.len())?;
        Ok(Self { rows, cols, data })
    }

    /// Field with the same value everywhere
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Apply `f` to every value
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two same-sized fields value by value
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the fields differ in size
    pub fn zip_map(&self, other: &ScalarField, f: impl Fn(f32, f32) -> f32) -> Result<Self> {
        check_dims(self.dims(), other.dims())?;
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Finite minimum and maximum, or `None` when no finite value exists
    pub fn finite_range(&self) -> Option<(f32, f32)> {
        finite_range(&self.data)
    }

    /// Mask of pixels whose value is `>= threshold`
    pub fn at_least(&self, threshold: f32) -> Result<BinaryMask> {
        self.mask_where(|v| v >= threshold)
    }

    /// Mask of pixels whose value is `< threshold`
    pub fn below(&self, threshold: f32) -> Result<BinaryMask> {
        self.mask_where(|v| v < threshold)
    }

    fn mask_where(&self, keep: impl Fn(f32) -> bool) -> Result<BinaryMask> {
        let bytes: Vec<u8> = self
            .data
            .iter()
            .map(|&v| if keep(v) { MASK_SET } else { 0 })
            .collect();
        Ok(BinaryMask {
            mat: mat_from_bytes(self.rows, self.cols, &bytes)?,
        })
    }

    /// Values at pixels where `mask` holds
    pub fn select(&self, mask: &BinaryMask) -> Vec<f32> {
        self.data
            .iter()
            .zip(mat_bytes(&mask.mat))
            .filter(|(_, &flag)| flag != 0)
            .map(|(&v, _)| v)
            .collect()
    }
}

/// Finite minimum and maximum of a slice, NaN and infinities ignored
pub(crate) fn finite_range(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Binary mask: `CV_8UC1`, 255 where set and 0 elsewhere
#[derive(Debug, Clone)]
pub struct BinaryMask {
    mat: Mat,
}

impl BinaryMask {
    /// Mask where nothing is set
    pub fn empty(rows: usize, cols: usize) -> Result<Self> {
        Self::filled(rows, cols, false)
    }

    pub fn filled(rows: usize, cols: usize, value: bool) -> Result<Self> {
        let value = if value { MASK_SET } else { 0 };
        Ok(Self {
            mat: filled_mat(rows, cols, value)?,
        })
    }

    /// Build from row-major flags
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `data.len() != rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<bool>) -> Result<Self> {
        let bytes: Vec<u8> = data.iter().map(|&v| if v { MASK_SET } else { 0 }).collect();
        Ok(Self {
            mat: mat_from_bytes(rows, cols, &bytes)?,
        })
    }

    /// Wrap an 8-bit single-channel matrix; any non-zero pixel is set
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` for another matrix type
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        ensure_single_byte(mat, "mask")?;
        if mat.empty() {
            return Ok(Self { mat: try_clone(mat)? });
        }
        let mut binary = Mat::default();
        core::compare(mat, &Scalar::all(0.0), &mut binary, CMP_NE)
            .map_err(|e| SegmentationError::opencv("mask binarization", e))?;
        Ok(Self { mat: binary })
    }

    /// Underlying `CV_8UC1` matrix
    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    pub fn rows(&self) -> usize {
        self.dims().0
    }

    pub fn cols(&self) -> usize {
        self.dims().1
    }

    pub fn dims(&self) -> (usize, usize) {
        mat_dims(&self.mat)
    }

    pub fn is_empty(&self) -> bool {
        self.mat.empty()
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        mat_bytes(&self.mat)[row * self.cols() + col] != 0
    }

    /// Row-major flags
    pub fn to_vec(&self) -> Vec<bool> {
        mat_bytes(&self.mat).iter().map(|&v| v != 0).collect()
    }

    /// Number of set pixels
    pub fn count(&self) -> usize {
        if self.mat.empty() {
            return 0;
        }
        core::count_non_zero(&self.mat).map_or(0, |n| n as usize)
    }

    pub fn is_clear(&self) -> bool {
        self.count() == 0
    }

    pub fn inverted(&self) -> Result<Self> {
        if self.mat.empty() {
            return Ok(self.clone());
        }
        let mut inverted = Mat::default();
        core::bitwise_not(&self.mat, &mut inverted, &Mat::default())
            .map_err(|e| SegmentationError::opencv("mask inversion", e))?;
        Ok(Self { mat: inverted })
    }

    /// Pixel-wise AND
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the masks differ in size
    pub fn intersect(&self, other: &BinaryMask) -> Result<Self> {
        check_dims(self.dims(), other.dims())?;
        if self.mat.empty() {
            return Ok(self.clone());
        }
        let mut both = Mat::default();
        core::bitwise_and(&self.mat, &other.mat, &mut both, &Mat::default())
            .map_err(|e| SegmentationError::opencv("mask intersection", e))?;
        Ok(Self { mat: both })
    }
}

impl PartialEq for BinaryMask {
    fn eq(&self, other: &Self) -> bool {
        self.dims() == other.dims() && mat_bytes(&self.mat) == mat_bytes(&other.mat)
    }
}

impl Eq for BinaryMask {}

/// Cover class code per pixel, `CV_8UC1`
#[derive(Debug, Clone)]
pub struct LabelMap {
    mat: Mat,
}

impl LabelMap {
    /// Map with every pixel set to `class`
    pub fn filled(rows: usize, cols: usize, class: CoverClass) -> Result<Self> {
        Ok(Self {
            mat: filled_mat(rows, cols, class.code())?,
        })
    }

    /// Build from raw class codes
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` on a length mismatch and
    /// `InvalidParameter` for a code outside {0, 1, 2}
    pub fn from_codes(rows: usize, cols: usize, codes: &[u8]) -> Result<Self> {
        check_codes(codes)?;
        Ok(Self {
            mat: mat_from_bytes(rows, cols, codes)?,
        })
    }

    /// Wrap an 8-bit single-channel matrix of class codes
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` for another matrix type and
    /// `InvalidParameter` for a code outside {0, 1, 2}
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        ensure_single_byte(mat, "label map")?;
        let mat = try_clone(mat)?;
        check_codes(mat_bytes(&mat))?;
        Ok(Self { mat })
    }

    /// Underlying `CV_8UC1` matrix of class codes
    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    pub fn rows(&self) -> usize {
        self.dims().0
    }

    pub fn cols(&self) -> usize {
        self.dims().1
    }

    pub fn dims(&self) -> (usize, usize) {
        mat_dims(&self.mat)
    }

    pub fn len(&self) -> usize {
        self.mat.total()
    }

    pub fn is_empty(&self) -> bool {
        self.mat.empty()
    }

    pub fn get(&self, row: usize, col: usize) -> CoverClass {
        let code = mat_bytes(&self.mat)[row * self.cols() + col];
        CoverClass::from_code(code).unwrap_or_default()
    }

    /// Overwrite one pixel
    ///
    /// # Errors
    ///
    /// Returns `OpenCv` if the pixel is out of bounds
    pub fn set(&mut self, row: usize, col: usize, class: CoverClass) -> Result<()> {
        *self
            .mat
            .at_2d_mut::<u8>(row as i32, col as i32)
            .map_err(|e| SegmentationError::opencv("label write", e))? = class.code();
        Ok(())
    }

    /// Row-major class codes
    pub fn codes(&self) -> &[u8] {
        mat_bytes(&self.mat)
    }

    /// Presence mask of one class
    pub fn class_mask(&self, class: CoverClass) -> Result<BinaryMask> {
        if self.mat.empty() {
            return Ok(BinaryMask {
                mat: try_clone(&self.mat)?,
            });
        }
        let mut mask = Mat::default();
        core::compare(&self.mat, &Scalar::all(class.code() as f64), &mut mask, CMP_EQ)
            .map_err(|e| SegmentationError::opencv("class mask", e))?;
        Ok(BinaryMask { mat: mask })
    }

    /// Overwrite `class` wherever `mask` holds
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the mask differs in size
    pub fn paint(&mut self, mask: &BinaryMask, class: CoverClass) -> Result<()> {
        check_dims(self.dims(), mask.dims())?;
        if self.mat.empty() {
            return Ok(());
        }
        self.mat
            .set_to(&Scalar::all(class.code() as f64), &mask.mat)
            .map_err(|e| SegmentationError::opencv("label paint", e))?;
        Ok(())
    }

    /// Number of pixels of one class
    pub fn count(&self, class: CoverClass) -> usize {
        let code = class.code();
        self.codes().iter().filter(|&&c| c == code).count()
    }
}

fn check_codes(codes: &[u8]) -> Result<()> {
    match codes.iter().find(|&&c| CoverClass::from_code(c).is_none()) {
        Some(&code) => Err(SegmentationError::invalid_parameter("class code", code)),
        None => Ok(()),
    }
}

impl PartialEq for LabelMap {
    fn eq(&self, other: &Self) -> bool {
        self.dims() == other.dims() && self.codes() == other.codes()
    }
}

impl Eq for LabelMap {}
