//! Morphological speckle removal on label maps
//!
//! Each class is cleaned on its own presence mask with an opening followed
//! by a closing, using a square structuring element of side `2·level + 1`.
//! Cleaned masks are written back in [`COMPOSITE_ORDER`], so plant wins
//! over straw and straw over soil where cleaned masks overlap. Pixels no
//! cleaned mask claims fall back to soil.

use opencv::{
    core::{Mat, Point, Size, BORDER_CONSTANT},
    imgproc::{
        get_structuring_element, morphology_default_border_value, morphology_ex, MORPH_CLOSE,
        MORPH_OPEN, MORPH_RECT,
    },
};
use tracing::debug;

use crate::constants::cleanup::{MAX_LEVEL, MIN_LEVEL};
use crate::grid::{BinaryMask, CoverClass, LabelMap, COMPOSITE_ORDER};
use crate::{Result, SegmentationError};

/// Per-class opening + closing
#[derive(Debug, Default, Clone, Copy)]
pub struct MorphologicalCleaner;

impl MorphologicalCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Side of the square structuring element for a cleanup level
    ///
    /// `None` for level 0 or a level whose side does not fit an `i32`.
    pub fn kernel_size(level: u32) -> Option<i32> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return None;
        }
        i32::try_from(level).ok()?.checked_mul(2)?.checked_add(1)
    }

    /// Clean a label map
    ///
    /// # Arguments
    ///
    /// * `labels` - Raw label map
    /// * `level` - Cleanup intensity, 1 to [`MAX_LEVEL`]
    ///
    /// # Returns
    ///
    /// Cleaned label map of the same dimensions
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a level outside the valid range, or
    /// `OpenCv` if a morphological operation fails
    pub fn clean(&self, labels: &LabelMap, level: u32) -> Result<LabelMap> {
        let side = checked_kernel_size(level)?;
        let mut cleaned = LabelMap::filled(labels.rows(), labels.cols(), CoverClass::Soil)?;
        if labels.is_empty() {
            return Ok(cleaned);
        }

        let kernel = self.kernel(effective_side(side, labels.dims()))?;
        for class in COMPOSITE_ORDER {
            let mask = self.clean_mask_with(&labels.class_mask(class)?, &kernel)?;
            cleaned.paint(&mask, class)?;
        }
        debug!(
            level,
            soil = cleaned.count(CoverClass::Soil),
            straw = cleaned.count(CoverClass::Straw),
            plant = cleaned.count(CoverClass::Plant),
            "cleaned label map"
        );
        Ok(cleaned)
    }

    /// Opening followed by closing of one binary mask
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a level outside the valid range, or
    /// `OpenCv` if a morphological operation fails
    pub fn clean_mask(&self, mask: &BinaryMask, level: u32) -> Result<BinaryMask> {
        let side = checked_kernel_size(level)?;
        if mask.is_empty() {
            return Ok(mask.clone());
        }
        let kernel = self.kernel(effective_side(side, mask.dims()))?;
        self.clean_mask_with(mask, &kernel)
    }

    fn kernel(&self, side: i32) -> Result<Mat> {
        get_structuring_element(MORPH_RECT, Size::new(side, side), Point::new(-1, -1))
            .map_err(|e| SegmentationError::opencv("kernel creation", e))
    }

    fn clean_mask_with(&self, mask: &BinaryMask, kernel: &Mat) -> Result<BinaryMask> {
        // outside the image counts as foreground for erosion, background for dilation
        let border = morphology_default_border_value()
            .map_err(|e| SegmentationError::opencv("border value", e))?;

        let mut opened = Mat::default();
        morphology_ex(
            mask.as_mat(),
            &mut opened,
            MORPH_OPEN,
            kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            border,
        )
        .map_err(|e| SegmentationError::opencv("opening", e))?;

        let mut closed = Mat::default();
        morphology_ex(
            &opened,
            &mut closed,
            MORPH_CLOSE,
            kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            border,
        )
        .map_err(|e| SegmentationError::opencv("closing", e))?;

        BinaryMask::from_mat(&closed)
    }
}

fn checked_kernel_size(level: u32) -> Result<i32> {
    MorphologicalCleaner::kernel_size(level)
        .ok_or_else(|| SegmentationError::invalid_parameter("cleanup_level", level))
}

/// Clamp a kernel side to the smallest square spanning the whole grid
///
/// Any larger kernel already reaches every pixel from every position, so
/// the result is unchanged.
fn effective_side(side: i32, (rows, cols): (usize, usize)) -> i32 {
    let spanning = i32::try_from(2 * rows.max(cols) + 1).unwrap_or(i32::MAX);
    side.min(spanning)
}
