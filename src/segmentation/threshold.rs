//! Adaptive threshold selection
//!
//! Picks a single cut point separating a scalar distribution into two
//! populations. The between-class variance search (Otsu) runs on a 256-bin
//! histogram spanning the selected values. When that search has no valid
//! split, because nothing is selected, nothing is finite or every value is
//! identical, a fixed percentile of the distribution is used instead.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::thresholds::{
    EMPTY_SELECTION_CUT, HISTOGRAM_BINS, NEUTRAL_BIAS, STRAW_FALLBACK_PERCENTILE,
    VEGETATION_FALLBACK_PERCENTILE,
};
use crate::grid::{finite_range, BinaryMask, ScalarField};

/// How a cut point was obtained
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// Between-class variance maximization
    Otsu,
    /// Fixed percentile (0–100) of the selected values
    Percentile(f32),
}

/// Why the bimodal search could not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// No pixel selected
    EmptySelection,
    /// Pixels selected, none of them finite
    NonFinite,
    /// Every selected value is identical
    ConstantField,
}

/// Cut point with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub value: f32,
    pub method: ThresholdMethod,
    pub fallback: Option<FallbackReason>,
}

impl Cut {
    /// True when the selection had no spread at all
    pub fn is_uniform(&self) -> bool {
        self.fallback == Some(FallbackReason::ConstantField)
    }
}

/// Otsu threshold with percentile fallback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThresholder {
    bins: usize,
    fallback_percentile: f32,
}

impl AdaptiveThresholder {
    /// Create a thresholder falling back to `fallback_percentile` (0–100)
    pub fn new(fallback_percentile: f32) -> Self {
        Self {
            bins: HISTOGRAM_BINS,
            fallback_percentile,
        }
    }

    /// Create a thresholder with a custom histogram resolution
    pub fn with_params(bins: usize, fallback_percentile: f32) -> Self {
        Self {
            bins: bins.max(2),
            fallback_percentile,
        }
    }

    /// Vegetation stage policy (80th percentile fallback)
    pub fn vegetation() -> Self {
        Self::new(VEGETATION_FALLBACK_PERCENTILE)
    }

    /// Residue stage policy (50th percentile fallback)
    pub fn residue() -> Self {
        Self::new(STRAW_FALLBACK_PERCENTILE)
    }

    pub fn fallback_percentile(&self) -> f32 {
        self.fallback_percentile
    }

    /// Cut point of a field, optionally restricted to pixels where `selection` holds
    pub fn threshold_field(&self, field: &ScalarField, selection: Option<&BinaryMask>) -> Cut {
        match selection {
            Some(mask) => self.threshold(&field.select(mask)),
            None => self.threshold(field.values()),
        }
    }

    /// Cut point of a set of values
    pub fn threshold(&self, values: &[f32]) -> Cut {
        match otsu_threshold(values, self.bins) {
            Ok(value) => Cut {
                value,
                method: ThresholdMethod::Otsu,
                fallback: None,
            },
            Err(reason) => {
                let value = percentile(values, self.fallback_percentile);
                debug!(
                    ?reason,
                    percentile = self.fallback_percentile,
                    value,
                    "bimodal search unavailable, using percentile"
                );
                Cut {
                    value,
                    method: ThresholdMethod::Percentile(self.fallback_percentile),
                    fallback: Some(reason),
                }
            }
        }
    }
}

/// Between-class variance maximizing threshold over a `bins`-bin histogram
///
/// Returns the center of the bin that best splits the finite values, or the
/// reason no split exists.
pub fn otsu_threshold(values: &[f32], bins: usize) -> Result<f32, FallbackReason> {
    if values.is_empty() {
        return Err(FallbackReason::EmptySelection);
    }
    let (min, max) = finite_range(values).ok_or(FallbackReason::NonFinite)?;
    if max <= min {
        return Err(FallbackReason::ConstantField);
    }

    let (min, max) = (min as f64, max as f64);
    let width = (max - min) / bins as f64;
    let mut histogram = vec![0u64; bins];
    for v in values.iter().filter(|v| v.is_finite()) {
        let bin = (((*v as f64 - min) / width) as usize).min(bins - 1);
        histogram[bin] += 1;
    }
    let centers: Vec<f64> = (0..bins).map(|i| min + (i as f64 + 0.5) * width).collect();

    let total: f64 = histogram.iter().sum::<u64>() as f64;
    let sum_total: f64 = histogram
        .iter()
        .zip(&centers)
        .map(|(&n, &c)| n as f64 * c)
        .sum();

    let mut weight_low = 0.0;
    let mut sum_low = 0.0;
    let mut best_variance = -1.0;
    let mut best_bin = 0;

    // split after bin t: [0, t] vs (t, bins)
    for t in 0..bins - 1 {
        weight_low += histogram[t] as f64;
        sum_low += histogram[t] as f64 * centers[t];
        let weight_high = total - weight_low;
        if weight_low == 0.0 || weight_high == 0.0 {
            continue;
        }
        let mean_low = sum_low / weight_low;
        let mean_high = (sum_total - sum_low) / weight_high;
        let variance = weight_low * weight_high * (mean_low - mean_high).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_bin = t;
        }
    }

    Ok(centers[best_bin] as f32)
}

/// Linearly interpolated percentile (0–100) of the finite values
///
/// An empty selection yields the neutral cut 0.5.
pub fn percentile(values: &[f32], p: f32) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return EMPTY_SELECTION_CUT;
    }
    sorted.sort_by(f32::total_cmp);

    let rank = (p.clamp(0.0, 100.0) as f64 / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let (a, b) = (sorted[lo] as f64, sorted[hi] as f64);
    (a + (b - a) * frac) as f32
}

/// Shift a cut by a bias slider in [0, 1] and clip to [0, 1]
///
/// 0.5 leaves the cut unchanged; above 0.5 lowers it multiplicatively,
/// below 0.5 raises it.
pub fn apply_bias(cut: f32, bias: f32) -> f32 {
    (cut * (1.0 - (bias - NEUTRAL_BIAS))).clamp(0.0, 1.0)
}
