//! Error types for heatgrid validation.

use thiserror::Error;

/// Result type alias using HeatgridError.
pub type HeatgridResult<T> = Result<T, HeatgridError>;

/// Validation errors raised while building grids and layer descriptions.
#[derive(Debug, Error, PartialEq)]
pub enum HeatgridError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid grid resolution {0}: must be between 1 and {max}", max = crate::grid::MAX_RESOLUTION)]
    InvalidResolution(usize),

    #[error("Invalid heatmap layer '{layer}': {message}")]
    InvalidLayer { layer: String, message: String },
}

impl HeatgridError {
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        HeatgridError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code, logged with configuration failures.
    pub fn code(&self) -> &'static str {
        match self {
            HeatgridError::MissingParameter(_) => "missing_parameter",
            HeatgridError::InvalidParameter { .. } => "invalid_parameter",
            HeatgridError::InvalidBbox(_) => "invalid_bbox",
            HeatgridError::InvalidResolution(_) => "invalid_resolution",
            HeatgridError::InvalidLayer { .. } => "invalid_layer",
        }
    }
}
