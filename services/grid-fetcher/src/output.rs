//! Overlay documents handed to the heatmap renderer.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use heatgrid_common::{BoundingBox, ColorDomain, GridSpec, HeatmapLayer, SamplePoint, ValueRange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// Serialization format of the overlay document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Points plus layer description
    #[default]
    Json,
    /// FeatureCollection of Point features with a `value` property
    Geojson,
}

/// Everything the renderer needs to draw one heatmap overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayDocument {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub layer: HeatmapLayer,
    pub bbox: BoundingBox,
    pub resolution: usize,
    /// Observed min/max/mean of the values
    pub value_range: Option<ValueRange>,
    /// Bounds the color ramp spans
    pub color_domain: Option<ColorDomain>,
    pub points: Vec<SamplePoint>,
}

impl OverlayDocument {
    pub fn new(layer: HeatmapLayer, grid: &GridSpec, points: Vec<SamplePoint>) -> Self {
        let value_range = ValueRange::from_points(&points);
        let color_domain = layer.effective_domain(value_range);

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            layer,
            bbox: grid.bbox,
            resolution: grid.resolution,
            value_range,
            color_domain,
            points,
        }
    }

    /// GeoJSON rendering. Coordinates are [lng, lat]; the layer description
    /// rides along as a foreign member.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .points
            .iter()
            .map(|p| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [p.longitude, p.latitude]
                    },
                    "properties": { "value": p.value }
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
            "heatmap": {
                "run_id": self.run_id,
                "generated_at": self.generated_at,
                "layer": self.layer,
                "color_domain": self.color_domain,
                "value_range": self.value_range,
            }
        })
    }

    pub fn render(&self, format: OutputFormat, pretty: bool) -> Result<String> {
        let value = match format {
            OutputFormat::Json => serde_json::to_value(self)?,
            OutputFormat::Geojson => self.to_geojson(),
        };

        let text = if pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(text)
    }

    /// Write the document to `path`, or stdout when no path is given.
    pub async fn write(
        &self,
        path: Option<&Path>,
        format: OutputFormat,
        pretty: bool,
    ) -> Result<()> {
        let mut text = self.render(format, pretty)?;
        text.push('\n');

        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, text.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write overlay: {}", path.display()))?;
                info!(
                    path = %path.display(),
                    points = self.points.len(),
                    format = ?format,
                    "Wrote overlay document"
                );
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }
}
