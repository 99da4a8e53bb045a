//! Class-area statistics of a label map

use serde::{Deserialize, Serialize};

use crate::grid::{CoverClass, LabelMap};

/// Share of the image covered by each class
///
/// Percentages are rounded to two decimals and sum to 100 up to rounding.
/// They serialize under the field-survey keys `solo_%`, `palha_%` and
/// `planta_%`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverMetrics {
    #[serde(rename = "solo_%")]
    pub soil_percent: f64,
    #[serde(rename = "palha_%")]
    pub straw_percent: f64,
    #[serde(rename = "planta_%")]
    pub plant_percent: f64,
    #[serde(default)]
    pub soil_pixels: usize,
    #[serde(default)]
    pub straw_pixels: usize,
    #[serde(default)]
    pub plant_pixels: usize,
    #[serde(default)]
    pub total_pixels: usize,
}

impl CoverMetrics {
    /// Percentage of one class
    pub fn percent(&self, class: CoverClass) -> f64 {
        match class {
            CoverClass::Soil => self.soil_percent,
            CoverClass::Straw => self.straw_percent,
            CoverClass::Plant => self.plant_percent,
        }
    }

    /// Sum of the three percentages
    pub fn total_percent(&self) -> f64 {
        self.soil_percent + self.straw_percent + self.plant_percent
    }
}

/// Class percentages of a label map
///
/// An absent or empty map yields all zeros.
pub fn percentages(label_map: Option<&LabelMap>) -> CoverMetrics {
    let Some(map) = label_map.filter(|m| !m.is_empty()) else {
        return CoverMetrics::default();
    };

    let total = map.len();
    let (mut soil, mut straw, mut plant) = (0usize, 0usize, 0usize);
    for &code in map.codes() {
        match CoverClass::from_code(code) {
            Some(CoverClass::Straw) => straw += 1,
            Some(CoverClass::Plant) => plant += 1,
            _ => soil += 1,
        }
    }

    let pct = |count: usize| round2(count as f64 / total as f64 * 100.0);
    CoverMetrics {
        soil_percent: pct(soil),
        straw_percent: pct(straw),
        plant_percent: pct(plant),
        soil_pixels: soil,
        straw_pixels: straw,
        plant_pixels: plant,
        total_pixels: total,
    }
}

/// Two-decimal rounding, exact ties to even (0.125 → 0.12)
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Number of isolated pixels of a class (8-connected components of size 1)
pub fn speckle_count(label_map: &LabelMap, class: CoverClass) -> usize {
    let (rows, cols) = label_map.dims();
    let mut count = 0;
    for row in 0..rows {
        for col in 0..cols {
            if label_map.get(row, col) != class {
                continue;
            }
            let has_neighbor = (row.saturating_sub(1)..=(row + 1).min(rows - 1)).any(|r| {
                (col.saturating_sub(1)..=(col + 1).min(cols - 1))
                    .any(|c| (r, c) != (row, col) && label_map.get(r, c) == class)
            });
            if !has_neighbor {
                count += 1;
            }
        }
    }
    count
}
