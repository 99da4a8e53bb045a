//! Error types for the cover_scan library

use thiserror::Error;

/// Result type alias for cover_scan operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Error types surfaced by the segmentation core
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// Input image is empty, not 3-channel or not 8-bit
    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    /// Caller-supplied parameter outside its valid range
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Two grids that must share dimensions do not
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: String, found: String },

    /// OpenCV operation failed
    #[error("OpenCV error: {operation}")]
    OpenCv {
        operation: String,
        #[source]
        source: opencv::Error,
    },
}

impl SegmentationError {
    /// Create an invalid image error
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// Create a dimension mismatch error from `(rows, cols)` pairs
    pub fn dimension_mismatch(expected: (usize, usize), found: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            expected: format!("{}x{}", expected.0, expected.1),
            found: format!("{}x{}", found.0, found.1),
        }
    }

    /// Create an OpenCV error with context
    pub fn opencv(operation: impl Into<String>, source: opencv::Error) -> Self {
        Self::OpenCv {
            operation: operation.into(),
            source,
        }
    }

    /// Get user-friendly error description for application display
    pub fn user_message(&self) -> String {
        match self {
            SegmentationError::InvalidImage { .. } => {
                "The image is missing or is not a color image. Please load a color photograph."
                    .to_string()
            }
            SegmentationError::InvalidParameter { parameter, .. } => {
                format!("The value for '{}' is out of range.", parameter)
            }
            _ => "Segmentation failed. Please try with a different image.".to_string(),
        }
    }
}
