//! Error types for the city generator core.

use thiserror::Error;

/// Errors produced while configuring or running the generator.
#[derive(Debug, Error)]
pub enum GenError {
    /// World bounds had a non-positive (or non-finite) width or height.
    #[error("invalid dimensions: width and height must be positive")]
    InvalidDimensions,

    /// The integration step is longer than the streamline separation.
    #[error("integration step {dstep} exceeds streamline separation {dsep}")]
    StepExceedsSeparation { dstep: f64, dsep: f64 },

    /// A basis field was configured with a negative decay exponent.
    #[error("basis field decay must be non-negative, got {0}")]
    NegativeDecay(f64),

    /// A parameter value was out of its valid range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    /// A parameter existed but had the wrong JSON type.
    #[error("parameter type mismatch for '{name}': expected {expected}, got {got}")]
    ParamTypeMismatch {
        name: String,
        expected: String,
        got: String,
    },

    /// A requested preset name was not registered.
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    /// A polygon had too few vertices or zero area for the requested operation.
    #[error("degenerate polygon: {0}")]
    DegeneratePolygon(String),

    /// Slicing a polygon by a line could not pair up the crossings.
    #[error("polygon slice failed: {0}")]
    SliceFailed(String),
}
