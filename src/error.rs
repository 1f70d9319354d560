//! Error types for patchcore.

use thiserror::Error;

use crate::image::ImageShape;

/// Errors that can occur while extracting, indexing, scoring or calibrating.
///
/// Every failure is local and synchronous: a call that returns an error
/// produces no partial score, map or threshold.
#[derive(Debug, Error)]
pub enum AnomalyError {
    /// Image does not have the fixed resolution / channel count the pipeline expects.
    #[error("invalid image: expected {expected}, got {actual}")]
    InvalidImage {
        expected: ImageShape,
        actual: ImageShape,
    },

    /// A pixel is NaN or infinite.
    #[error("non-finite pixel {value} at channel {channel}, row {row}, column {col}")]
    NonFinitePixel {
        channel: usize,
        row: usize,
        col: usize,
        value: f32,
    },

    /// Feature dimensionality of a query disagrees with the memory bank.
    #[error("dimension mismatch: expected {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Not enough data to build a bank or calibrate a threshold.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Scoring was attempted against a bank holding zero vectors.
    #[error("memory bank is empty")]
    EmptyBank,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The backbone produced activations that break its output contract.
    #[error("backbone error: {0}")]
    Backbone(String),

    /// A decision was requested before any threshold was calibrated.
    #[error("detector has no threshold; calibrate it first")]
    NotCalibrated,

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration document.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl AnomalyError {
    /// True for the malformed / mismatched input family.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AnomalyError::InvalidImage { .. }
                | AnomalyError::NonFinitePixel { .. }
                | AnomalyError::DimensionMismatch { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnomalyError>;
