//! Soil / straw / plant segmentation module
//!
//! This module thresholds the index fields into the three cover classes,
//! composites them into a label map and removes isolated speckle.

pub mod cleanup;
pub mod engine;
pub mod threshold;

pub use cleanup::MorphologicalCleaner;
pub use engine::{composite, Segmentation, SegmentationOutput, Segmenter, StageThreshold};
pub use threshold::{
    apply_bias, otsu_threshold, percentile, AdaptiveThresholder, Cut, FallbackReason,
    ThresholdMethod,
};
