//! Two-stage soil / straw / plant segmentation
//!
//! Stage 1 separates living vegetation from background on a weighted blend
//! of the vegetation indices. Stage 2 splits the remaining background into
//! straw residue and bare soil on a residue score that mixes the straw index
//! with lightness and chroma. Both stages threshold adaptively and then shift
//! the cut by their bias slider.

use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::{SegmentationConfig, SegmentationParams};
use crate::constants::{thresholds::NEUTRAL_BIAS, CHANNEL_SCALE};
use crate::grid::{BinaryMask, CoverClass, LabelMap, ScalarField};
use crate::indices::{mat_dims, ColorChannels, ColorSpaceAdapter, IndexBank, IndexSet};
use crate::metrics::{percentages, CoverMetrics};
use crate::segmentation::cleanup::MorphologicalCleaner;
use crate::segmentation::threshold::{
    apply_bias, AdaptiveThresholder, Cut, FallbackReason, ThresholdMethod,
};
use crate::{Result, SegmentationError};

/// Cut point of one stage before and after the bias shift
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageThreshold {
    /// Adaptive cut
    pub raw: f32,
    /// Cut after the bias slider, clipped to [0, 1]
    pub adjusted: f32,
    pub method: ThresholdMethod,
    pub fallback: Option<FallbackReason>,
}

impl StageThreshold {
    fn new(cut: Cut, bias: f32) -> Self {
        Self {
            raw: cut.value,
            adjusted: apply_bias(cut.value, bias),
            method: cut.method,
            fallback: cut.fallback,
        }
    }
}

/// Raw (pre-cleanup) segmentation with its masks
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub label_map: LabelMap,
    pub plant_mask: BinaryMask,
    pub straw_mask: BinaryMask,
    pub soil_mask: BinaryMask,
    pub vegetation: StageThreshold,
    pub residue: StageThreshold,
}

/// Cleaned segmentation with class percentages
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationOutput {
    /// Label map after morphological cleanup
    pub label_map: LabelMap,
    pub metrics: CoverMetrics,
    /// Stage output before cleanup
    pub raw: Segmentation,
}

/// Segmentation engine
pub struct Segmenter {
    config: SegmentationConfig,
    index_bank: IndexBank,
    adapter: ColorSpaceAdapter,
    vegetation_thresholder: AdaptiveThresholder,
    residue_thresholder: AdaptiveThresholder,
    cleaner: MorphologicalCleaner,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    /// Create a segmenter with the default weights and threshold policy
    pub fn new() -> Self {
        Self::with_config(SegmentationConfig::default())
    }

    /// Create a segmenter from a configuration
    pub fn with_config(config: SegmentationConfig) -> Self {
        let t = config.thresholds;
        Self {
            index_bank: IndexBank::from_config(&config),
            adapter: ColorSpaceAdapter::new(),
            vegetation_thresholder: AdaptiveThresholder::with_params(
                t.histogram_bins,
                t.vegetation_fallback_percentile,
            ),
            residue_thresholder: AdaptiveThresholder::with_params(
                t.histogram_bins,
                t.straw_fallback_percentile,
            ),
            cleaner: MorphologicalCleaner::new(),
            config,
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Index set of `image` with the configured NDI guard
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` if the image is empty or not 8-bit 3-channel
    pub fn compute_indices(&self, image: &Mat) -> Result<IndexSet> {
        self.index_bank.compute(image)
    }

    /// Compute indices and segment with the configured parameters
    ///
    /// # Errors
    ///
    /// Same conditions as [`Segmenter::segment`]
    pub fn run(&self, image: &Mat) -> Result<SegmentationOutput> {
        let indices = self.compute_indices(image)?;
        self.segment(image, &indices, &self.config.params)
    }

    /// Run the full pipeline: both stages, cleanup and percentages
    ///
    /// # Arguments
    ///
    /// * `image` - BGR image the index set was computed from
    /// * `indices` - Index set of `image`
    /// * `params` - Plant sensitivity, straw bias and cleanup level
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` for a bad image, `InvalidParameter` for
    /// out-of-range parameters and `DimensionMismatch` if `indices` belongs
    /// to an image of a different size
    #[instrument(skip_all, fields(rows = image.rows(), cols = image.cols()))]
    pub fn segment(
        &self,
        image: &Mat,
        indices: &IndexSet,
        params: &SegmentationParams,
    ) -> Result<SegmentationOutput> {
        params.validate()?;
        let raw = self.segment_raw(image, indices, params.plant_sensitivity, params.straw_bias)?;
        let label_map = self.cleaner.clean(&raw.label_map, params.cleanup_level)?;
        let metrics = percentages(Some(&label_map));
        debug!(?metrics, "segmentation complete");
        Ok(SegmentationOutput {
            label_map,
            metrics,
            raw,
        })
    }

    /// Segmentation with neutral bias and no cleanup
    ///
    /// # Errors
    ///
    /// Same conditions as [`Segmenter::segment_raw`]
    pub fn segment_unbiased(&self, image: &Mat, indices: &IndexSet) -> Result<Segmentation> {
        self.segment_raw(image, indices, NEUTRAL_BIAS, NEUTRAL_BIAS)
    }

    /// Both stages and compositing, without cleanup
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` for a bad image, `InvalidParameter` for a
    /// bias outside [0, 1] and `DimensionMismatch` if `indices` belongs to
    /// an image of a different size
    pub fn segment_raw(
        &self,
        image: &Mat,
        indices: &IndexSet,
        plant_sensitivity: f32,
        straw_bias: f32,
    ) -> Result<Segmentation> {
        SegmentationParams::new(plant_sensitivity, straw_bias, 1).validate()?;
        let channels = self.adapter.convert(image)?;
        let dims = mat_dims(image);
        if indices.dims() != dims {
            return Err(SegmentationError::dimension_mismatch(dims, indices.dims()));
        }

        // stage 1: vegetation vs. background
        let veg_score = self.vegetation_score(indices)?;
        let veg_cut = self.vegetation_thresholder.threshold_field(&veg_score, None);
        let vegetation = StageThreshold::new(veg_cut, plant_sensitivity);
        let plant_mask = if veg_cut.is_uniform() && indices.mean_excess_green <= 0.0 {
            // no contrast to threshold; a non-green uniform image has no canopy
            BinaryMask::empty(dims.0, dims.1)?
        } else {
            veg_score.at_least(vegetation.adjusted)?
        };
        debug!(
            raw = vegetation.raw,
            adjusted = vegetation.adjusted,
            method = ?vegetation.method,
            plant = plant_mask.count(),
            "vegetation stage"
        );

        // stage 2: straw vs. soil on the remaining pixels
        let background = plant_mask.inverted()?;
        let straw_score = self.straw_score(indices, &channels)?;
        let straw_cut = self
            .residue_thresholder
            .threshold_field(&straw_score, Some(&background));
        let residue = StageThreshold::new(straw_cut, straw_bias);
        let straw_mask = straw_score.at_least(residue.adjusted)?.intersect(&background)?;
        let soil_mask = straw_score.below(residue.adjusted)?.intersect(&background)?;
        debug!(
            raw = residue.raw,
            adjusted = residue.adjusted,
            method = ?residue.method,
            straw = straw_mask.count(),
            soil = soil_mask.count(),
            "residue stage"
        );

        let label_map = composite(&plant_mask, &straw_mask)?;
        Ok(Segmentation {
            label_map,
            plant_mask,
            straw_mask,
            soil_mask,
            vegetation,
            residue,
        })
    }

    /// `w_exg·ExG + w_exgr·ExGR + w_ndi·NDI + w_cive·(1 − CIVE)`
    pub fn vegetation_score(&self, indices: &IndexSet) -> Result<ScalarField> {
        let w = self.config.vegetation_weights;
        let greenness = indices
            .exg
            .zip_map(&indices.exgr, |exg, exgr| w.exg * exg + w.exgr * exgr)?;
        let greenness = greenness.zip_map(&indices.ndi, |acc, ndi| acc + w.ndi * ndi)?;
        greenness.zip_map(&indices.cive, |acc, cive| acc + w.cive * (1.0 - cive))
    }

    /// `w_s·Straw + w_cb·Cb/255 − w_cr·Cr/255 + w_l·L/255`
    pub fn straw_score(
        &self,
        indices: &IndexSet,
        channels: &ColorChannels,
    ) -> Result<ScalarField> {
        let w = self.config.straw_weights;
        let score = indices.straw.zip_map(&channels.cb, |straw, cb| {
            w.straw_index * straw + w.cb * (cb / CHANNEL_SCALE)
        })?;
        let score = score.zip_map(&channels.cr, |acc, cr| acc - w.cr * (cr / CHANNEL_SCALE))?;
        score.zip_map(&channels.lightness, |acc, l| acc + w.lightness * (l / CHANNEL_SCALE))
    }
}

/// Build a label map from the stage masks: soil everywhere, then straw,
/// then plant on top
///
/// # Errors
///
/// Returns `DimensionMismatch` if the masks differ in size
pub fn composite(plant_mask: &BinaryMask, straw_mask: &BinaryMask) -> Result<LabelMap> {
    let mut labels = LabelMap::filled(plant_mask.rows(), plant_mask.cols(), CoverClass::Soil)?;
    labels.paint(straw_mask, CoverClass::Straw)?;
    labels.paint(plant_mask, CoverClass::Plant)?;
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indices::compute_indices;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    fn uniform_bgr(rows: i32, cols: i32, bgr: [f64; 3]) -> Mat {
        let color = Scalar::new(bgr[0], bgr[1], bgr[2], 0.0);
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, color).unwrap()
    }

    /// Brown soil with a green patch in the top-left and a pale straw band on the right
    fn field_scene() -> Mat {
        let mut image = uniform_bgr(12, 12, [42.0, 60.0, 110.0]);
        for row in 0..12 {
            for col in 0..12 {
                let px = image.at_2d_mut::<Vec3b>(row, col).unwrap();
                if row < 5 && col < 5 {
                    *px = Vec3b::from([40, 190, 50]);
                } else if col >= 8 {
                    *px = Vec3b::from([130, 175, 205]);
                }
            }
        }
        image
    }

    #[test]
    fn test_composite_plant_wins() {
        let plant = BinaryMask::from_vec(1, 4, vec![true, true, false, false]).unwrap();
        let straw = BinaryMask::from_vec(1, 4, vec![true, false, true, false]).unwrap();
        let labels = composite(&plant, &straw).unwrap();
        assert_eq!(labels.codes(), &[2, 2, 1, 0]);
    }

    #[test]
    fn test_scene_classes() {
        let image = field_scene();
        let indices = compute_indices(&image).unwrap();
        let seg = Segmenter::new().segment_unbiased(&image, &indices).unwrap();

        assert_eq!(seg.label_map.get(1, 1), CoverClass::Plant);
        assert_eq!(seg.label_map.get(10, 10), CoverClass::Straw);
        assert_eq!(seg.label_map.get(10, 2), CoverClass::Soil);
        assert_eq!(seg.vegetation.method, ThresholdMethod::Otsu);
        assert_eq!(seg.residue.method, ThresholdMethod::Otsu);
    }

    #[test]
    fn test_masks_partition_image() {
        let image = field_scene();
        let indices = compute_indices(&image).unwrap();
        let seg = Segmenter::new().segment_unbiased(&image, &indices).unwrap();

        for row in 0..12 {
            for col in 0..12 {
                let flags = [
                    seg.plant_mask.get(row, col),
                    seg.straw_mask.get(row, col),
                    seg.soil_mask.get(row, col),
                ];
                assert_eq!(flags.iter().filter(|&&f| f).count(), 1);
            }
        }
    }

    #[test]
    fn test_neutral_bias_keeps_raw_thresholds() {
        let image = field_scene();
        let indices = compute_indices(&image).unwrap();
        let seg = Segmenter::new().segment_unbiased(&image, &indices).unwrap();
        assert_eq!(seg.vegetation.adjusted, seg.vegetation.raw);
        assert_eq!(seg.residue.adjusted, seg.residue.raw);
    }

    #[test]
    fn test_sensitivity_grows_plant_area() {
        let image = field_scene();
        let indices = compute_indices(&image).unwrap();
        let segmenter = Segmenter::new();
        let low = segmenter.segment_raw(&image, &indices, 0.1, 0.5).unwrap();
        let high = segmenter.segment_raw(&image, &indices, 1.0, 0.5).unwrap();
        assert!(high.plant_mask.count() >= low.plant_mask.count());
        assert!(high.vegetation.adjusted < low.vegetation.adjusted);
    }

    #[test]
    fn test_all_plant_leaves_residue_stage_empty() {
        let image = uniform_bgr(6, 6, [30.0, 200.0, 30.0]);
        let indices = compute_indices(&image).unwrap();
        let seg = Segmenter::new().segment_unbiased(&image, &indices).unwrap();

        assert_eq!(seg.plant_mask.count(), 36);
        assert!(seg.straw_mask.is_clear());
        assert!(seg.soil_mask.is_clear());
        assert_eq!(seg.residue.fallback, Some(FallbackReason::EmptySelection));
    }

    #[test]
    fn test_uniform_brown_has_no_plant() {
        let image = uniform_bgr(6, 6, [42.0, 42.0, 165.0]);
        let indices = compute_indices(&image).unwrap();
        let seg = Segmenter::new().segment_unbiased(&image, &indices).unwrap();

        assert!(seg.plant_mask.is_clear());
        assert_eq!(seg.straw_mask.count() + seg.soil_mask.count(), 36);
        assert!(seg.vegetation.fallback == Some(FallbackReason::ConstantField));
    }

    #[test]
    fn test_mismatched_index_set_rejected() {
        let image = uniform_bgr(4, 4, [30.0, 200.0, 30.0]);
        let other = compute_indices(&uniform_bgr(4, 5, [30.0, 200.0, 30.0])).unwrap();
        assert!(matches!(
            Segmenter::new().segment_unbiased(&image, &other),
            Err(SegmentationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_bias_out_of_range_rejected() {
        let image = uniform_bgr(4, 4, [30.0, 200.0, 30.0]);
        let indices = compute_indices(&image).unwrap();
        assert!(matches!(
            Segmenter::new().segment_raw(&image, &indices, 1.5, 0.5),
            Err(SegmentationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_run_uses_configured_params() {
        let image = field_scene();
        let params = SegmentationParams::new(0.8, 0.3, 2);
        let segmenter = Segmenter::with_config(SegmentationConfig::with_params(params));

        let output = segmenter.run(&image).unwrap();
        let indices = compute_indices(&image).unwrap();
        let expected = Segmenter::new().segment(&image, &indices, &params).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_run_rejects_invalid_configured_params() {
        let config = SegmentationConfig::with_params(SegmentationParams::new(0.5, 0.5, 0));
        let result = Segmenter::with_config(config).run(&field_scene());
        assert!(matches!(result, Err(SegmentationError::InvalidParameter { .. })));
    }
}
