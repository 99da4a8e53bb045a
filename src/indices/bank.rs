//! Vegetation and residue index bank
//!
//! Computes five per-pixel color indices from a BGR image and min–max
//! normalizes each one against its own range. Normalization is per image,
//! so index values are only comparable within the image they came from.
//!
//! - ExG = 2g − r − b
//! - ExGR = 3g − 2.4r − b
//! - CIVE = −(0.441r − 0.811g + 0.385b + 18.787), sign flipped so higher means greener
//! - NDI = (g − r) / (g + r + ε)
//! - StrawIndex = (r + g) / 2 − b

use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SegmentationConfig;
use crate::constants::indices::{
    CIVE_BLUE, CIVE_GREEN, CIVE_OFFSET, CIVE_RED, EXGR_RED, NDI_EPSILON,
};
use crate::grid::ScalarField;
use crate::indices::{bgr_pixels, mat_dims};
use crate::Result;

/// Names of the fields in an [`IndexSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    ExG,
    ExGR,
    Cive,
    Ndi,
    StrawIndex,
}

impl IndexKind {
    /// All indices in computation order
    pub const ALL: [IndexKind; 5] = [
        IndexKind::ExG,
        IndexKind::ExGR,
        IndexKind::Cive,
        IndexKind::Ndi,
        IndexKind::StrawIndex,
    ];

    /// Conventional short name
    pub fn name(self) -> &'static str {
        match self {
            IndexKind::ExG => "ExG",
            IndexKind::ExGR => "ExGR",
            IndexKind::Cive => "CIVE",
            IndexKind::Ndi => "NDI",
            IndexKind::StrawIndex => "StrawIndex",
        }
    }
}

/// The five normalized index fields of one image
///
/// Build a new set whenever the source image changes; a set is only valid
/// for the image it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSet {
    pub exg: ScalarField,
    pub exgr: ScalarField,
    pub cive: ScalarField,
    pub ndi: ScalarField,
    pub straw: ScalarField,
    /// Mean of the raw (unnormalized) excess green over the whole image
    pub mean_excess_green: f32,
}

impl IndexSet {
    /// Field for one index
    pub fn get(&self, kind: IndexKind) -> &ScalarField {
        match kind {
            IndexKind::ExG => &self.exg,
            IndexKind::ExGR => &self.exgr,
            IndexKind::Cive => &self.cive,
            IndexKind::Ndi => &self.ndi,
            IndexKind::StrawIndex => &self.straw,
        }
    }

    /// `(name, field)` pairs in computation order
    pub fn iter(&self) -> impl Iterator<Item = (IndexKind, &ScalarField)> {
        IndexKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Dimensions shared by every field
    pub fn dims(&self) -> (usize, usize) {
        self.exg.dims()
    }
}

/// Index calculator
pub struct IndexBank {
    ndi_epsilon: f32,
}

impl Default for IndexBank {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBank {
    /// Create an index bank with the standard NDI guard
    pub fn new() -> Self {
        Self {
            ndi_epsilon: NDI_EPSILON,
        }
    }

    /// Create an index bank with a custom NDI denominator guard
    pub fn with_epsilon(ndi_epsilon: f32) -> Self {
        Self { ndi_epsilon }
    }

    /// Create an index bank using the configured NDI guard
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self::with_epsilon(config.ndi_epsilon)
    }

    pub fn ndi_epsilon(&self) -> f32 {
        self.ndi_epsilon
    }

    /// Compute the index set of a BGR image
    ///
    /// # Arguments
    ///
    /// * `image` - 8-bit, 3-channel image in BGR order
    ///
    /// # Returns
    ///
    /// `IndexSet` with every field normalized to [0, 1]
    ///
    /// # Errors
    ///
    /// Returns `InvalidImage` if the image is empty or not 8-bit 3-channel;
    /// nothing is computed in that case.
    #[instrument(skip_all, fields(rows = image.rows(), cols = image.cols()))]
    pub fn compute(&self, image: &Mat) -> Result<IndexSet> {
        let pixels = bgr_pixels(image)?;
        let (rows, cols) = mat_dims(image);

        let raw = |f: &dyn Fn(f32, f32, f32) -> f32| -> Result<ScalarField> {
            let data = pixels.iter().map(|&[b, g, r]| f(b, g, r)).collect();
            ScalarField::from_vec(rows, cols, data)
        };

        let exg_raw = raw(&|b, g, r| 2.0 * g - r - b)?;
        let exgr_raw = raw(&|b, g, r| 3.0 * g - EXGR_RED * r - b)?;
        let cive_raw = raw(&|b, g, r| {
            -(CIVE_RED * r - CIVE_GREEN * g + CIVE_BLUE * b + CIVE_OFFSET)
        })?;
        let eps = self.ndi_epsilon;
        let ndi_raw = raw(&|_, g, r| (g - r) / (g + r + eps))?;
        let straw_raw = raw(&|b, g, r| (r + g) / 2.0 - b)?;

        let mean_excess_green = if exg_raw.is_empty() {
            0.0
        } else {
            exg_raw.values().iter().sum::<f32>() / exg_raw.len() as f32
        };

        let set = IndexSet {
            exg: normalize(&exg_raw),
            exgr: normalize(&exgr_raw),
            cive: normalize(&cive_raw),
            ndi: normalize(&ndi_raw),
            straw: normalize(&straw_raw),
            mean_excess_green,
        };
        debug!(rows, cols, mean_excess_green, "computed index set");
        Ok(set)
    }
}

/// Compute the index set of a BGR image with the standard constants
///
/// # Errors
///
/// Returns `InvalidImage` if the image is empty or not 8-bit 3-channel
pub fn compute_indices(image: &Mat) -> Result<IndexSet> {
    IndexBank::new().compute(image)
}

/// Min–max scale a field to [0, 1] against its own finite range
///
/// NaN values are ignored when locating the range and stay NaN. A field
/// with no spread (constant, or no finite values at all) maps to all zeros.
pub fn normalize(field: &ScalarField) -> ScalarField {
    match field.finite_range() {
        Some((min, max)) if max - min > 0.0 => {
            let span = max - min;
            field.map(|v| ((v - min) / span).clamp(0.0, 1.0))
        }
        _ => ScalarField::filled(field.rows(), field.cols(), 0.0),
    }
}
