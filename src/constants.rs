//! Index coefficients, score weights and threshold policy constants
//!
//! Compile-time values shared by the index bank, the segmentation stages and
//! the presentation layer of the host application.

use palette::Srgb;

use crate::grid::CoverClass;

/// Vegetation and residue index coefficients
pub mod indices {
    /// Guard added to `g + r` in the NDI denominator
    pub const NDI_EPSILON: f32 = 1e-6;

    /// CIVE coefficients (Kataoka et al.): `0.441·r − 0.811·g + 0.385·b + 18.787`
    pub const CIVE_RED: f32 = 0.441;
    pub const CIVE_GREEN: f32 = 0.811;
    pub const CIVE_BLUE: f32 = 0.385;
    pub const CIVE_OFFSET: f32 = 18.787;

    /// ExGR red weight: `3·g − 2.4·r − b`
    pub const EXGR_RED: f32 = 2.4;
}

/// Linear score weights for both segmentation stages
pub mod weights {
    /// Stage 1: `0.4·ExG + 0.3·ExGR + 0.2·NDI + 0.1·(1 − CIVE)`
    pub const VEG_EXG: f32 = 0.4;
    pub const VEG_EXGR: f32 = 0.3;
    pub const VEG_NDI: f32 = 0.2;
    pub const VEG_CIVE: f32 = 0.1;

    /// Stage 2: `0.4·Straw + 0.3·Cb/255 − 0.3·Cr/255 + 0.3·L/255`
    pub const STRAW_INDEX: f32 = 0.4;
    pub const STRAW_CB: f32 = 0.3;
    pub const STRAW_CR: f32 = 0.3;
    pub const STRAW_LIGHTNESS: f32 = 0.3;
}

/// Adaptive threshold policy
pub mod thresholds {
    /// Histogram resolution for the between-class variance search (8-bit)
    pub const HISTOGRAM_BINS: usize = 256;

    /// Percentile used when the vegetation score has no bimodal split
    pub const VEGETATION_FALLBACK_PERCENTILE: f32 = 80.0;

    /// Percentile used when the residue score has no bimodal split
    pub const STRAW_FALLBACK_PERCENTILE: f32 = 50.0;

    /// Value returned by a percentile over an empty selection
    pub const EMPTY_SELECTION_CUT: f32 = 0.5;

    /// Bias value that leaves a threshold unchanged
    pub const NEUTRAL_BIAS: f32 = 0.5;
}

/// Morphological cleanup limits
pub mod cleanup {
    /// Lightest cleanup (3x3 structuring element)
    pub const MIN_LEVEL: u32 = 1;

    /// Strongest level whose kernel side `2·level + 1` still fits an `i32`
    pub const MAX_LEVEL: u32 = (i32::MAX as u32 - 1) / 2;
}

/// Native scale of the 8-bit color-space channels
pub const CHANNEL_SCALE: f32 = 255.0;

/// Display color for each class code, shared by every rendering call site
pub const CLASS_COLORS: [(CoverClass, Srgb<u8>); 3] = [
    (CoverClass::Soil, Srgb::new(165, 42, 42)),
    (CoverClass::Straw, Srgb::new(255, 255, 0)),
    (CoverClass::Plant, Srgb::new(0, 200, 0)),
];

/// Look up the display color of a class
pub fn class_color(class: CoverClass) -> Srgb<u8> {
    // table rows are ordered by class code
    CLASS_COLORS[class.code() as usize].1
}
