//! Configuration loading for grid fetch runs.
//!
//! A run is described by a YAML file (see `config/grid.yaml`), with any
//! field overridable from the command line or environment.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use heatgrid_common::{BoundingBox, GridSpec, HeatgridError, HeatmapLayer};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::fetch::FetchConfig;
use crate::source::{
    HttpSourceConfig, UrlTemplate, ValuePath, DEFAULT_URL_TEMPLATE, DEFAULT_VALUE_PATH,
};

/// Root configuration loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default = "default_layer")]
    pub layer: HeatmapLayer,
}

fn default_layer() -> HeatmapLayer {
    HeatmapLayer::new("temperature")
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            source: SourceConfig::default(),
            fetch: FetchSettings::default(),
            layer: default_layer(),
        }
    }
}

/// Area and resolution to sample.
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub bbox: BoundingBox,
    /// Subdivisions per axis
    pub resolution: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::new(-80.0, -180.0, 80.0, 180.0),
            resolution: 10,
        }
    }
}

/// Weather API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Usually supplied through OPENWEATHER_API_KEY instead
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_value_path")]
    pub value_path: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_value_path() -> String {
    DEFAULT_VALUE_PATH.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            api_key: None,
            value_path: default_value_path(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Concurrency and retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    /// Cap on in-flight requests; unbounded when absent
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,
}

fn default_initial_retry_delay() -> u64 {
    500
}

fn default_max_retry_delay() -> u64 {
    10_000
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            max_retries: 0,
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
        }
    }
}

/// Values taken from the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bbox: Option<BoundingBox>,
    pub resolution: Option<usize>,
    pub url_template: Option<String>,
    pub api_key: Option<String>,
    pub value_path: Option<String>,
    pub max_concurrent: Option<usize>,
    pub max_retries: Option<u32>,
    pub layer_id: Option<String>,
}

impl FetcherConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded grid fetch config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(bbox) = overrides.bbox {
            self.grid.bbox = bbox;
        }
        if let Some(resolution) = overrides.resolution {
            self.grid.resolution = resolution;
        }
        if let Some(template) = overrides.url_template {
            self.source.url_template = template;
        }
        if let Some(key) = overrides.api_key {
            self.source.api_key = Some(key);
        }
        if let Some(path) = overrides.value_path {
            self.source.value_path = path;
        }
        if let Some(limit) = overrides.max_concurrent {
            self.fetch.max_concurrent = Some(limit);
        }
        if let Some(retries) = overrides.max_retries {
            self.fetch.max_retries = retries;
        }
        if let Some(id) = overrides.layer_id {
            self.layer.id = id;
        }
    }

    /// Validated grid specification.
    pub fn grid_spec(&self) -> Result<GridSpec> {
        GridSpec::new(self.grid.bbox, self.grid.resolution).context("Invalid grid configuration")
    }

    /// Validated HTTP source settings.
    pub fn source_config(&self) -> Result<HttpSourceConfig> {
        let api_key = self.source.api_key.clone().unwrap_or_default();
        let url_template = UrlTemplate::new(&self.source.url_template, api_key)
            .context("Invalid weather source configuration")?;
        let value_path =
            ValuePath::parse(&self.source.value_path).context("Invalid weather value path")?;

        Ok(HttpSourceConfig {
            url_template,
            value_path,
            request_timeout: Duration::from_secs(self.source.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.source.connect_timeout_secs),
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_concurrent: self.fetch.max_concurrent,
            max_retries: self.fetch.max_retries,
            initial_retry_delay: Duration::from_millis(self.fetch.initial_retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.fetch.max_retry_delay_ms),
        }
    }

    /// Check every section, reporting the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.grid_spec()?;
        self.source_config()?;
        self.layer.validate().context("Invalid heatmap layer")?;
        if let Some(limit) = self.fetch.max_concurrent {
            if limit == 0 || limit > Semaphore::MAX_PERMITS {
                anyhow::bail!(
                    "fetch.max_concurrent must be between 1 and {}",
                    Semaphore::MAX_PERMITS
                );
            }
        }
        Ok(())
    }
}

/// Code of the validation error behind a configuration failure, for logging.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HeatgridError>())
        .map(HeatgridError::code)
        .unwrap_or("invalid_config")
}
