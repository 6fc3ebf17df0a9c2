//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{HeatgridError, HeatgridResult};

/// A geographic bounding box given by its start and end corners, in degrees.
///
/// The start corner is where sampling begins. It does not have to be the
/// south-west corner: a start latitude above the end latitude simply walks
/// the grid southwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(start_lat: f64, start_lng: f64, end_lat: f64, end_lng: f64) -> Self {
        Self {
            start_lat,
            start_lng,
            end_lat,
            end_lng,
        }
    }

    /// Parse a bbox string: "startLat,startLng,endLat,endLng"
    pub fn from_str_coords(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))
        };

        Ok(Self {
            start_lat: parse(parts[0])?,
            start_lng: parse(parts[1])?,
            end_lat: parse(parts[2])?,
            end_lng: parse(parts[3])?,
        })
    }

    /// Signed latitude extent (end minus start).
    pub fn lat_span(&self) -> f64 {
        self.end_lat - self.start_lat
    }

    /// Signed longitude extent (end minus start).
    pub fn lng_span(&self) -> f64 {
        self.end_lng - self.start_lng
    }

    /// Reject non-finite corners and coordinates outside the globe.
    ///
    /// Longitudes up to +/-360 are accepted so both the -180..180 and the
    /// 0..360 conventions work.
    pub fn validate(&self) -> HeatgridResult<()> {
        for (name, value) in [
            ("start_lat", self.start_lat),
            ("start_lng", self.start_lng),
            ("end_lat", self.end_lat),
            ("end_lng", self.end_lng),
        ] {
            if !value.is_finite() {
                return Err(HeatgridError::InvalidBbox(format!(
                    "{} is not a finite number",
                    name
                )));
            }
        }

        for (name, lat) in [("start_lat", self.start_lat), ("end_lat", self.end_lat)] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(HeatgridError::InvalidBbox(format!(
                    "{} {} outside [-90, 90]",
                    name, lat
                )));
            }
        }

        for (name, lng) in [("start_lng", self.start_lng), ("end_lng", self.end_lng)] {
            if !(-360.0..=360.0).contains(&lng) {
                return Err(HeatgridError::InvalidBbox(format!(
                    "{} {} outside [-360, 360]",
                    name, lng
                )));
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = BboxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_coords(s)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.start_lat, self.start_lng, self.end_lat, self.end_lng
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'startLat,startLng,endLat,endLng'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),
}
