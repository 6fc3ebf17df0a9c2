//! Weather grid fetcher.
//!
//! Samples a weather value at every point of an n x n grid with:
//! - All requests in flight concurrently (optionally capped)
//! - Per-point retry with exponential backoff
//! - All-or-nothing results: any failing point fails the run, naming its coordinates
//! - A JSON or GeoJSON overlay document for the heatmap renderer

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use heatgrid_common::BoundingBox;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use grid_fetcher::{
    FetcherConfig, GridFetcher, HttpWeatherSource, OutputFormat, Overrides, OverlayDocument,
};

#[derive(Parser, Debug)]
#[command(name = "grid-fetcher")]
#[command(about = "Fetch weather values over a lat/lon grid for a heatmap overlay")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "GRID_FETCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Bounding box as "startLat,startLng,endLat,endLng"
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Subdivisions per axis (n x n points)
    #[arg(short = 'n', long)]
    resolution: Option<usize>,

    /// Weather API key
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Request URL with {lat}, {lon} and {key} placeholders
    #[arg(long, env = "WEATHER_URL_TEMPLATE")]
    url_template: Option<String>,

    /// Dotted path of the numeric field to extract (default main.temp)
    #[arg(long)]
    value_path: Option<String>,

    /// Maximum concurrent requests (default: unbounded)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Retries per point for transient failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Heatmap layer id
    #[arg(long)]
    layer_id: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Pretty-print the output document
    #[arg(long)]
    pretty: bool,

    /// Log filter (RUST_LOG syntax), overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this port while the fetch runs (the
    /// listener stops when the process exits)
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bbox: self.bbox,
            resolution: self.resolution,
            url_template: self.url_template.clone(),
            api_key: self.api_key.clone(),
            value_path: self.value_path.clone(),
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            layer_id: self.layer_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so the document can go to stdout
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Some(port) = args.metrics_port {
        grid_fetcher::metrics::install_exporter(port)?;
    }

    let mut config = match &args.config {
        Some(path) => FetcherConfig::load(path)?,
        None => FetcherConfig::default(),
    };
    config.apply_overrides(args.overrides());
    if let Err(e) = config.validate() {
        error!(
            code = grid_fetcher::config::error_code(&e),
            error = %format!("{:#}", e),
            "Invalid configuration"
        );
        return Err(e);
    }

    let grid = config.grid_spec()?;
    let source = HttpWeatherSource::new(config.source_config()?)?;
    let fetcher = GridFetcher::new(Arc::new(source), config.fetch_config());

    info!(
        bbox = %grid.bbox,
        resolution = grid.resolution,
        points = grid.point_count(),
        max_concurrent = ?config.fetch.max_concurrent,
        max_retries = config.fetch.max_retries,
        "Starting grid fetch"
    );

    let points = match fetcher.sample_grid(&grid).await {
        Ok(points) => points,
        Err(e) => {
            error!(
                index = e.index,
                lat = e.lat,
                lon = e.lon,
                attempts = e.attempts,
                error = %e.kind,
                "Grid fetch failed; no overlay written"
            );
            return Err(e.into());
        }
    };

    let document = OverlayDocument::new(config.layer.clone(), &grid, points);
    document
        .write(args.output.as_deref(), args.format, args.pretty)
        .await?;

    if let Some(range) = document.value_range {
        info!(
            run_id = %document.run_id,
            points = document.points.len(),
            min = range.min,
            max = range.max,
            mean = range.mean,
            "Grid fetch complete"
        );
    }

    Ok(())
}
