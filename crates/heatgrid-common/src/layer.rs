//! Description of the heatmap layer the sampled points are drawn with.
//!
//! The layer itself is rendered by an external map SDK. These types only carry
//! the parameters it needs alongside the points.

use serde::{Deserialize, Serialize};

use crate::error::{HeatgridError, HeatgridResult};
use crate::{BoundingBox, ValueRange};

/// Value bounds mapped onto the two ends of the color ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorDomain {
    pub min: f64,
    pub max: f64,
}

impl From<ValueRange> for ColorDomain {
    fn from(range: ValueRange) -> Self {
        Self {
            min: range.min,
            max: range.max,
        }
    }
}

/// Heatmap layer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapLayer {
    /// Layer identifier on the map
    pub id: String,

    /// Overlay opacity, 0.0 (invisible) to 1.0 (opaque)
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Fixed value-to-color bounds; the observed range is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_domain: Option<ColorDomain>,

    /// Region the overlay is restricted to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,

    /// Accuracy/performance trade-off; higher is coarser and faster
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,

    /// Inverse-distance-weighting exponent
    #[serde(default = "default_power")]
    pub power: f64,

    /// Id of the map layer this overlay is inserted beneath
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_layer: Option<String>,
}

fn default_opacity() -> f64 {
    0.5
}

fn default_accuracy() -> f64 {
    4.0
}

fn default_power() -> f64 {
    3.0
}

impl HeatmapLayer {
    /// A layer with the given id and default display parameters.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opacity: default_opacity(),
            color_domain: None,
            region: None,
            accuracy: default_accuracy(),
            power: default_power(),
            before_layer: None,
        }
    }

    pub fn validate(&self) -> HeatgridResult<()> {
        let invalid = |message: String| HeatgridError::InvalidLayer {
            layer: self.id.clone(),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(HeatgridError::MissingParameter("layer.id".to_string()));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(invalid(format!("opacity {} outside [0, 1]", self.opacity)));
        }
        if !(self.accuracy.is_finite() && self.accuracy > 0.0) {
            return Err(invalid(format!("accuracy {} must be > 0", self.accuracy)));
        }
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(invalid(format!("power {} must be > 0", self.power)));
        }
        if let Some(domain) = &self.color_domain {
            if !(domain.min < domain.max) {
                return Err(invalid(format!(
                    "color domain min {} must be below max {}",
                    domain.min, domain.max
                )));
            }
        }
        if let Some(region) = &self.region {
            region.validate()?;
        }
        Ok(())
    }

    /// The color bounds to render with: the configured domain, or else the
    /// observed value range.
    pub fn effective_domain(&self, observed: Option<ValueRange>) -> Option<ColorDomain> {
        self.color_domain.or_else(|| observed.map(ColorDomain::from))
    }
}
