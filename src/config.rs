//! Configuration structures for the cover_scan segmentation pipeline.
//!
//! The three interactive parameters live in [`SegmentationParams`]; the
//! score weights and threshold policy, which normally stay at their
//! defaults, live alongside them in [`SegmentationConfig`].
//!
//! # Configuration Loading
//!
//! ```no_run
//! use cover_scan::SegmentationConfig;
//! use std::path::Path;
//!
//! // Load from file
//! let config = SegmentationConfig::from_json_file(Path::new("config.json"))?;
//!
//! // Or use defaults
//! let config = SegmentationConfig::default();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::{cleanup, indices, thresholds, weights};
use crate::{Result, SegmentationError};

/// User-tunable parameters, one per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationParams {
    /// Plant sensitivity in [0, 1]; 0.5 is neutral, higher finds more plant
    pub plant_sensitivity: f32,

    /// Straw bias in [0, 1]; 0.5 is neutral, higher finds more straw
    pub straw_bias: f32,

    /// Morphological cleanup intensity, 1 to `MAX_LEVEL` (slider offers 1–3)
    pub cleanup_level: u32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            plant_sensitivity: thresholds::NEUTRAL_BIAS,
            straw_bias: thresholds::NEUTRAL_BIAS,
            cleanup_level: cleanup::MIN_LEVEL,
        }
    }
}

impl SegmentationParams {
    pub fn new(plant_sensitivity: f32, straw_bias: f32, cleanup_level: u32) -> Self {
        Self {
            plant_sensitivity,
            straw_bias,
            cleanup_level,
        }
    }

    /// Check every parameter against its range
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a bias outside [0, 1] (NaN included)
    /// or a cleanup level outside [`cleanup::MIN_LEVEL`, `cleanup::MAX_LEVEL`]
    pub fn validate(&self) -> Result<()> {
        check_unit("plant_sensitivity", self.plant_sensitivity)?;
        check_unit("straw_bias", self.straw_bias)?;
        if !(cleanup::MIN_LEVEL..=cleanup::MAX_LEVEL).contains(&self.cleanup_level) {
            return Err(SegmentationError::invalid_parameter(
                "cleanup_level",
                self.cleanup_level,
            ));
        }
        Ok(())
    }
}

fn check_unit(parameter: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SegmentationError::invalid_parameter(parameter, value));
    }
    Ok(())
}

/// Stage 1 score weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VegetationWeights {
    pub exg: f32,
    pub exgr: f32,
    pub ndi: f32,
    /// Applied to `1 − CIVE`
    pub cive: f32,
}

impl Default for VegetationWeights {
    fn default() -> Self {
        Self {
            exg: weights::VEG_EXG,
            exgr: weights::VEG_EXGR,
            ndi: weights::VEG_NDI,
            cive: weights::VEG_CIVE,
        }
    }
}

/// Stage 2 score weights; chroma and lightness terms use channel/255
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrawWeights {
    pub straw_index: f32,
    pub cb: f32,
    /// Subtracted
    pub cr: f32,
    pub lightness: f32,
}

impl Default for StrawWeights {
    fn default() -> Self {
        Self {
            straw_index: weights::STRAW_INDEX,
            cb: weights::STRAW_CB,
            cr: weights::STRAW_CR,
            lightness: weights::STRAW_LIGHTNESS,
        }
    }
}

/// Adaptive threshold policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Histogram bins for the bimodal search
    pub histogram_bins: usize,

    /// Percentile (0–100) used by stage 1 when no bimodal split exists
    pub vegetation_fallback_percentile: f32,

    /// Percentile (0–100) used by stage 2 when no bimodal split exists
    pub straw_fallback_percentile: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            histogram_bins: thresholds::HISTOGRAM_BINS,
            vegetation_fallback_percentile: thresholds::VEGETATION_FALLBACK_PERCENTILE,
            straw_fallback_percentile: thresholds::STRAW_FALLBACK_PERCENTILE,
        }
    }
}

/// Complete segmentation configuration.
///
/// Can be serialized to/from JSON for reproducible runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Interactive parameters
    #[serde(default)]
    pub params: SegmentationParams,

    #[serde(default)]
    pub vegetation_weights: VegetationWeights,

    #[serde(default)]
    pub straw_weights: StrawWeights,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// NDI denominator guard
    #[serde(default = "default_ndi_epsilon")]
    pub ndi_epsilon: f32,
}

fn default_ndi_epsilon() -> f32 {
    indices::NDI_EPSILON
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self::with_params(SegmentationParams::default())
    }
}

impl SegmentationConfig {
    /// Default configuration with the given interactive parameters
    pub fn with_params(params: SegmentationParams) -> Self {
        Self {
            params,
            vegetation_weights: VegetationWeights::default(),
            straw_weights: StrawWeights::default(),
            thresholds: ThresholdConfig::default(),
            ndi_epsilon: indices::NDI_EPSILON,
        }
    }

    /// Parse configuration from a JSON string
    pub fn from_json_str(json: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(json)?;
        config.params.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_json_file(
        path: &std::path::Path,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(
        &self,
        path: &std::path::Path,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
