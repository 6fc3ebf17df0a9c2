//! Weather grid sampling.
//!
//! Builds a regular grid of sample points over a bounding box, fetches one
//! weather value per point with concurrent requests, and packages the
//! result as an overlay document for an external heatmap renderer.

pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod output;
pub mod source;

pub use config::{FetcherConfig, Overrides};
pub use error::{FetchError, FetchErrorKind};
pub use fetch::{FetchConfig, GridFetcher};
pub use output::{OutputFormat, OverlayDocument};
pub use source::{HttpSourceConfig, HttpWeatherSource, UrlTemplate, ValuePath, WeatherSource};
