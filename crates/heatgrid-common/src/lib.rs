//! Common types shared across the heatgrid workspace.
//!
//! Everything here is pure: building a sample grid, describing the heatmap
//! layer the points are handed to, and the validation errors for both.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod layer;

pub use bbox::BoundingBox;
pub use error::{HeatgridError, HeatgridResult};
pub use grid::{generate_grid, GridSpec, SamplePoint, ValueRange, MAX_RESOLUTION};
pub use layer::{ColorDomain, HeatmapLayer};
