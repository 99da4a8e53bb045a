//! # Cover Scan
//!
//! A Rust crate for estimating ground cover from field photographs.
//!
//! Every pixel of an image is classified as bare soil, straw residue or
//! living plant:
//! - Computing normalized vegetation and residue indices
//! - Separating vegetation from background with an adaptive threshold
//! - Splitting the background into straw and soil
//! - Removing speckle with per-class morphological cleanup
//! - Reporting the share of the image covered by each class
//!
//! ## Example
//!
//! ```rust,no_run
//! use cover_scan::{compute_indices, segment};
//! use opencv::imgcodecs;
//!
//! let image = imgcodecs::imread("plot.jpg", imgcodecs::IMREAD_COLOR)?;
//! let indices = compute_indices(&image)?;
//! let (labels, metrics) = segment(&image, &indices, 0.5, 0.5, 1)?;
//! println!("plant {}%, straw {}%", metrics.plant_percent, metrics.straw_percent);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use opencv::core::Mat;

pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod indices;
pub mod metrics;
pub mod segmentation;

pub use config::{SegmentationConfig, SegmentationParams};
pub use constants::{class_color, CLASS_COLORS};
pub use error::{Result, SegmentationError};
pub use grid::{BinaryMask, CoverClass, LabelMap, ScalarField};
pub use indices::{ColorChannels, ColorSpaceAdapter, IndexBank, IndexKind, IndexSet};
pub use metrics::{speckle_count, CoverMetrics};
pub use segmentation::{
    MorphologicalCleaner, Segmentation, SegmentationOutput, Segmenter, StageThreshold,
};

/// Compute the normalized index set of a BGR image
///
/// # Errors
///
/// Returns `InvalidImage` if the image is empty or not 8-bit 3-channel
pub fn compute_indices(image: &Mat) -> Result<IndexSet> {
    indices::compute_indices(image)
}

/// Segment an image into soil, straw and plant and measure class cover
///
/// This is the main entry point. `indices` must come from
/// [`compute_indices`] on the same image.
///
/// # Arguments
///
/// * `image` - 8-bit BGR image
/// * `indices` - Index set of `image`
/// * `plant_sensitivity` - In [0, 1]; higher finds more plant
/// * `straw_bias` - In [0, 1]; higher finds more straw
/// * `cleanup_level` - Morphological cleanup intensity, 1 or more
///
/// # Returns
///
/// The cleaned label map and its class percentages
///
/// # Errors
///
/// Returns `SegmentationError` if:
/// - The image is empty or not 8-bit 3-channel
/// - A bias is outside [0, 1] or the cleanup level is 0 or too large
/// - `indices` was computed from an image of another size
pub fn segment(
    image: &Mat,
    indices: &IndexSet,
    plant_sensitivity: f32,
    straw_bias: f32,
    cleanup_level: u32,
) -> Result<(LabelMap, CoverMetrics)> {
    let params = SegmentationParams::new(plant_sensitivity, straw_bias, cleanup_level);
    let output = Segmenter::new().segment(image, indices, &params)?;
    Ok((output.label_map, output.metrics))
}

/// Class percentages of a label map; `None` or an empty map gives zeros
pub fn percentages(label_map: Option<&LabelMap>) -> CoverMetrics {
    metrics::percentages(label_map)
}
