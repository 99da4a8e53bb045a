//! Integration tests for the complete segmentation pipeline
//!
//! These tests drive the public API end to end on synthetic images:
//! - Index computation and image validation
//! - Both segmentation stages and compositing
//! - Morphological cleanup
//! - Class percentages and their serialized form

use cover_scan::constants::cleanup::MAX_LEVEL;
use cover_scan::segmentation::composite;
use cover_scan::{
    compute_indices, percentages, segment, speckle_count, BinaryMask, CoverClass, LabelMap,
    SegmentationConfig, SegmentationError, SegmentationParams, Segmenter,
};
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC1, CV_8UC3};
use opencv::prelude::*;

const SOIL: [u8; 3] = [42, 60, 110];
const GREEN: [u8; 3] = [40, 190, 50];
const STRAW: [u8; 3] = [130, 175, 205];

fn uniform_bgr(rows: i32, cols: i32, bgr: [f64; 3]) -> Mat {
    let color = Scalar::new(bgr[0], bgr[1], bgr[2], 0.0);
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, color).unwrap()
}

fn paint(image: &mut Mat, row: i32, col: i32, bgr: [u8; 3]) {
    *image.at_2d_mut::<Vec3b>(row, col).unwrap() = Vec3b::from(bgr);
}

/// 24x24 plot: soil with a 10x10 plant block, a straw band along the right
/// edge and a few isolated plant and straw pixels
fn speckled_plot() -> Mat {
    let mut image = uniform_bgr(24, 24, [SOIL[0] as f64, SOIL[1] as f64, SOIL[2] as f64]);
    for row in 0..24 {
        for col in 0..24 {
            if (2..12).contains(&row) && (2..12).contains(&col) {
                paint(&mut image, row, col, GREEN);
            } else if col >= 18 {
                paint(&mut image, row, col, STRAW);
            }
        }
    }
    for (row, col) in [(16, 4), (20, 8), (5, 15), (14, 14)] {
        paint(&mut image, row, col, GREEN);
    }
    for (row, col) in [(20, 2), (16, 12)] {
        paint(&mut image, row, col, STRAW);
    }
    image
}

// ============================================================================
// Uniform Images
// ============================================================================

#[test]
fn test_all_green_image_is_all_plant() {
    let image = uniform_bgr(16, 16, [30.0, 200.0, 30.0]);
    let indices = compute_indices(&image).unwrap();

    let (labels, metrics) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();

    assert_eq!(labels.count(CoverClass::Plant), 256);
    assert_eq!(metrics.plant_percent, 100.0);
    assert_eq!(metrics.straw_percent, 0.0);
    assert_eq!(metrics.soil_percent, 0.0);
}

#[test]
fn test_uniform_brown_image_has_no_plant() {
    let image = uniform_bgr(16, 16, [42.0, 42.0, 165.0]);
    let indices = compute_indices(&image).unwrap();

    let (labels, metrics) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();

    assert_eq!(labels.count(CoverClass::Plant), 0);
    assert_eq!(metrics.plant_percent, 0.0);
    assert!((metrics.soil_percent + metrics.straw_percent - 100.0).abs() <= 0.01 + 1e-9);
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_grayscale_image_rejected() {
    let gray = Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(128.0)).unwrap();
    match compute_indices(&gray) {
        Err(SegmentationError::InvalidImage { .. }) => {}
        other => panic!("Expected InvalidImage, got: {:?}", other),
    }
}

#[test]
fn test_empty_image_rejected() {
    let result = compute_indices(&Mat::default());
    assert!(matches!(result, Err(SegmentationError::InvalidImage { .. })));
}

#[test]
fn test_segment_rejects_grayscale_with_foreign_indices() {
    let color = uniform_bgr(8, 8, [30.0, 200.0, 30.0]);
    let indices = compute_indices(&color).unwrap();
    let gray = Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(128.0)).unwrap();

    let result = segment(&gray, &indices, 0.5, 0.5, 1);
    assert!(matches!(result, Err(SegmentationError::InvalidImage { .. })));
}

#[test]
fn test_invalid_parameters_rejected() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    let cases = [
        (1.2, 0.5, 1),
        (0.5, -0.1, 1),
        (f32::NAN, 0.5, 1),
        (0.5, 0.5, 0),
        (0.5, 0.5, 1 << 30),
        (0.5, 0.5, u32::MAX),
    ];
    for (sensitivity, bias, level) in cases {
        let result = segment(&image, &indices, sensitivity, bias, level);
        assert!(
            matches!(result, Err(SegmentationError::InvalidParameter { .. })),
            "({}, {}, {}) should be rejected",
            sensitivity,
            bias,
            level
        );
    }
}

#[test]
fn test_index_set_from_other_image_rejected() {
    let image = speckled_plot();
    let indices = compute_indices(&uniform_bgr(12, 24, [30.0, 200.0, 30.0])).unwrap();
    let result = segment(&image, &indices, 0.5, 0.5, 1);
    assert!(matches!(result, Err(SegmentationError::DimensionMismatch { .. })));
}

// ============================================================================
// Pipeline Properties
// ============================================================================

#[test]
fn test_scene_regions_classified() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    let (labels, _) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();

    assert_eq!(labels.dims(), (24, 24));
    assert_eq!(labels.get(6, 6), CoverClass::Plant);
    assert_eq!(labels.get(10, 21), CoverClass::Straw);
    assert_eq!(labels.get(22, 14), CoverClass::Soil);
}

#[test]
fn test_metrics_conserved() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    for level in 1..=3 {
        let (labels, metrics) = segment(&image, &indices, 0.5, 0.5, level).unwrap();
        assert!((metrics.total_percent() - 100.0).abs() <= 0.01 + 1e-9);
        for class in [CoverClass::Soil, CoverClass::Straw, CoverClass::Plant] {
            assert!((0.0..=100.0).contains(&metrics.percent(class)));
        }
        assert_eq!(metrics, percentages(Some(&labels)));
    }
}

#[test]
fn test_cleanup_removes_speckle() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();
    let raw = Segmenter::new().segment_unbiased(&image, &indices).unwrap();

    assert_eq!(speckle_count(&raw.label_map, CoverClass::Plant), 4);
    assert_eq!(speckle_count(&raw.label_map, CoverClass::Straw), 2);

    let (level_one, _) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();
    let (level_three, _) = segment(&image, &indices, 0.5, 0.5, 3).unwrap();

    for class in [CoverClass::Soil, CoverClass::Straw, CoverClass::Plant] {
        let raw_count = speckle_count(&raw.label_map, class);
        let one = speckle_count(&level_one, class);
        let three = speckle_count(&level_three, class);
        assert!(one <= raw_count, "{:?}: level 1 added speckle", class);
        assert!(three <= one, "{:?}: level 3 left more speckle than level 1", class);
    }
    // the 10x10 block survives the 7x7 kernel
    assert_eq!(level_three.get(6, 6), CoverClass::Plant);
}

#[test]
fn test_levels_above_slider_range() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    // 10x10 block survives a 9x9 kernel, not an 11x11 one
    let (level_four, _) = segment(&image, &indices, 0.5, 0.5, 4).unwrap();
    let (level_five, _) = segment(&image, &indices, 0.5, 0.5, 5).unwrap();
    assert_eq!(level_four.get(6, 6), CoverClass::Plant);
    assert_eq!(level_five.count(CoverClass::Plant), 0);

    // a kernel far wider than the image behaves like one spanning it
    let (spanning, metrics) = segment(&image, &indices, 0.5, 0.5, 24).unwrap();
    let (widest, _) = segment(&image, &indices, 0.5, 0.5, MAX_LEVEL).unwrap();
    assert_eq!(widest, spanning);
    assert_eq!(metrics.soil_percent, 100.0);

    let result = segment(&image, &indices, 0.5, 0.5, 1 << 30);
    assert!(matches!(result, Err(SegmentationError::InvalidParameter { .. })));
}

#[test]
fn test_plant_wins_over_straw() {
    let plant = BinaryMask::from_vec(2, 2, vec![true, false, true, false]).unwrap();
    let straw = BinaryMask::from_vec(2, 2, vec![true, true, false, false]).unwrap();

    let labels = composite(&plant, &straw).unwrap();

    assert_eq!(labels.get(0, 0), CoverClass::Plant);
    assert_eq!(labels.get(0, 1), CoverClass::Straw);
    assert_eq!(labels.get(1, 0), CoverClass::Plant);
    assert_eq!(labels.get(1, 1), CoverClass::Soil);
}

#[test]
fn test_neutral_bias_keeps_adaptive_cuts() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();
    let params = SegmentationParams::new(0.5, 0.5, 1);

    let output = Segmenter::new().segment(&image, &indices, &params).unwrap();

    assert_eq!(output.raw.vegetation.adjusted, output.raw.vegetation.raw);
    assert_eq!(output.raw.residue.adjusted, output.raw.residue.raw);
}

#[test]
fn test_higher_sensitivity_never_shrinks_plant() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    let (neutral, _) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();
    let (eager, _) = segment(&image, &indices, 0.9, 0.5, 1).unwrap();
    let (strict, _) = segment(&image, &indices, 0.1, 0.5, 1).unwrap();

    assert!(eager.count(CoverClass::Plant) >= neutral.count(CoverClass::Plant));
    assert!(neutral.count(CoverClass::Plant) >= strict.count(CoverClass::Plant));
}

#[test]
fn test_segmentation_is_deterministic() {
    let image = speckled_plot();
    let first_indices = compute_indices(&image).unwrap();
    let second_indices = compute_indices(&image).unwrap();
    assert_eq!(first_indices, second_indices);

    let first = segment(&image, &first_indices, 0.7, 0.3, 2).unwrap();
    let second = segment(&image, &second_indices, 0.7, 0.3, 2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_configured_segmenter_matches_entry_point() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plot.json");
    SegmentationConfig::with_params(SegmentationParams::new(0.6, 0.4, 2))
        .to_json_file(&path)
        .unwrap();
    let config = SegmentationConfig::from_json_file(&path).unwrap();
    let params = config.params;

    let output = Segmenter::with_config(config).segment(&image, &indices, &params).unwrap();
    let (labels, metrics) = segment(&image, &indices, 0.6, 0.4, 2).unwrap();

    assert_eq!(output.label_map, labels);
    assert_eq!(output.metrics, metrics);
}

// ============================================================================
// Metrics Output
// ============================================================================

#[test]
fn test_percentages_of_missing_map_are_zero() {
    let metrics = percentages(None);
    assert_eq!(metrics.soil_percent, 0.0);
    assert_eq!(metrics.straw_percent, 0.0);
    assert_eq!(metrics.plant_percent, 0.0);

    let empty = LabelMap::filled(0, 0, CoverClass::Soil).unwrap();
    assert_eq!(percentages(Some(&empty)), metrics);
}

#[test]
fn test_metrics_json_keys() {
    let image = speckled_plot();
    let indices = compute_indices(&image).unwrap();
    let (_, metrics) = segment(&image, &indices, 0.5, 0.5, 1).unwrap();

    let json = serde_json::to_value(metrics).unwrap();
    for key in ["solo_%", "palha_%", "planta_%"] {
        assert!(json.get(key).is_some(), "missing key {}", key);
    }
    assert_eq!(json["total_pixels"], 576);
}
