//! Regular sample grids over a bounding box.

use crate::error::{HeatgridError, HeatgridResult};
use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// One sample of the grid: a location and the value measured there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    pub value: f64,
}

impl SamplePoint {
    /// A point with no value yet.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            value: 0.0,
        }
    }

    pub fn with_value(self, value: f64) -> Self {
        Self { value, ..self }
    }
}

/// Largest accepted resolution (a million points).
pub const MAX_RESOLUTION: usize = 1000;

/// An n x n sampling of a bounding box.
///
/// Row `i` steps latitude, column `j` steps longitude, and points are laid
/// out row-major. The end corner itself is never sampled: the last row and
/// column sit one step short of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub bbox: BoundingBox,
    /// Subdivisions per axis
    pub resolution: usize,
}

impl GridSpec {
    /// Create a validated grid specification.
    pub fn new(bbox: BoundingBox, resolution: usize) -> HeatgridResult<Self> {
        if resolution == 0 || resolution > MAX_RESOLUTION {
            return Err(HeatgridError::InvalidResolution(resolution));
        }
        bbox.validate()?;
        Ok(Self { bbox, resolution })
    }

    /// Latitude increment between rows.
    pub fn lat_step(&self) -> f64 {
        self.bbox.lat_span() / self.resolution as f64
    }

    /// Longitude increment between columns.
    pub fn lng_step(&self) -> f64 {
        self.bbox.lng_span() / self.resolution as f64
    }

    /// The unvalued point at row `i`, column `j`.
    pub fn point(&self, i: usize, j: usize) -> Option<SamplePoint> {
        if i >= self.resolution || j >= self.resolution {
            return None;
        }
        Some(SamplePoint::new(
            self.bbox.start_lat + i as f64 * self.lat_step(),
            self.bbox.start_lng + j as f64 * self.lng_step(),
        ))
    }

    /// Get the 1D sequence index for a 2D grid position.
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i * self.resolution + j
    }

    /// Total number of grid points.
    pub fn point_count(&self) -> usize {
        self.resolution * self.resolution
    }

    /// Generate every sample point in row-major order, all valued 0.
    pub fn points(&self) -> Vec<SamplePoint> {
        let lat_step = self.lat_step();
        let lng_step = self.lng_step();

        let mut points = Vec::with_capacity(self.point_count());
        for i in 0..self.resolution {
            let latitude = self.bbox.start_lat + i as f64 * lat_step;
            for j in 0..self.resolution {
                points.push(SamplePoint::new(
                    latitude,
                    self.bbox.start_lng + j as f64 * lng_step,
                ));
            }
        }
        points
    }
}

/// Generate the n x n sample grid for a bounding box.
pub fn generate_grid(bbox: BoundingBox, resolution: usize) -> HeatgridResult<Vec<SamplePoint>> {
    Ok(GridSpec::new(bbox, resolution)?.points())
}

/// Summary of the values carried by a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ValueRange {
    /// Compute the range over `points`; `None` when there are none.
    pub fn from_points(points: &[SamplePoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let (min, max, sum) = points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), p| (min.min(p.value), max.max(p.value), sum + p.value),
        );

        Some(Self {
            min,
            max,
            mean: sum / points.len() as f64,
        })
    }
}
