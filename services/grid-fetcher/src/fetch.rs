//! Concurrent fetching of values for every point of a sample grid.
//!
//! Key properties:
//! - One spawned task per point, all started up front
//! - Optional cap on in-flight requests
//! - Per-point retry with exponential backoff
//! - All-or-nothing: the first point that definitively fails aborts the
//!   batch, and no partially valued grid is ever returned
//! - Response i always lands on point i, whatever order responses arrive in

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use heatgrid_common::{GridSpec, SamplePoint};
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::error::{FetchError, FetchErrorKind};
use crate::source::WeatherSource;

/// Configuration for a grid fetch.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum requests in flight at once; `None` starts them all immediately
    pub max_concurrent: Option<usize>,
    /// Retries per point after the first attempt
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            max_retries: 0,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(10),
        }
    }
}

/// Fetches values for sample points from a [`WeatherSource`].
pub struct GridFetcher<S: ?Sized> {
    source: Arc<S>,
    config: FetchConfig,
}

impl<S> GridFetcher<S>
where
    S: WeatherSource + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Generate the grid's points and fetch all of their values.
    pub async fn sample_grid(&self, grid: &GridSpec) -> Result<Vec<SamplePoint>, FetchError> {
        self.fetch_values(grid.points()).await
    }

    /// Fetch a value for every point.
    ///
    /// Returns the same points, in the same order, each carrying its fetched
    /// value. On failure the points are dropped and the error names the
    /// first point that could not be fetched.
    #[instrument(skip(self, points), fields(points = points.len()))]
    pub async fn fetch_values(
        &self,
        points: Vec<SamplePoint>,
    ) -> Result<Vec<SamplePoint>, FetchError> {
        let started = Instant::now();
        let limiter = self
            .config
            .max_concurrent
            .map(|limit| Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS))));

        let mut tasks = JoinSet::new();
        for (index, point) in points.iter().enumerate() {
            let source = self.source.clone();
            let limiter = limiter.clone();
            let config = self.config.clone();
            let (lat, lon) = (point.latitude, point.longitude);

            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let outcome =
                    AssertUnwindSafe(fetch_with_retry(source.as_ref(), lat, lon, &config))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err((1, FetchErrorKind::Task("weather source panicked".to_string())))
                        });

                (index, outcome)
            });
        }

        debug!(spawned = points.len(), "Dispatched weather requests");

        let mut values = vec![0.0; points.len()];
        let mut pending = vec![true; points.len()];

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    // Panics are caught inside the task, so this is cancellation.
                    // The task's index is gone; report the first point still missing.
                    let index = pending.iter().position(|p| *p).unwrap_or(0);
                    tasks.abort_all();
                    let kind = FetchErrorKind::Task(e.to_string());
                    return Err(self.fail(&points, index, 1, kind, started));
                }
            };

            match outcome {
                Ok(value) => {
                    values[index] = value;
                    pending[index] = false;
                }
                Err((attempts, kind)) => {
                    tasks.abort_all();
                    return Err(self.fail(&points, index, attempts, kind, started));
                }
            }
        }

        let elapsed = started.elapsed();
        histogram!("heatgrid_batch_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
        counter!("heatgrid_batches_total", "outcome" => "success").increment(1);

        info!(
            points = points.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Fetched values for all grid points"
        );

        Ok(points
            .into_iter()
            .zip(values)
            .map(|(point, value)| point.with_value(value))
            .collect())
    }

    fn fail(
        &self,
        points: &[SamplePoint],
        index: usize,
        attempts: u32,
        kind: FetchErrorKind,
        started: Instant,
    ) -> FetchError {
        let point = points[index];
        counter!("heatgrid_batches_total", "outcome" => "failure").increment(1);
        warn!(
            index = index,
            lat = point.latitude,
            lon = point.longitude,
            attempts = attempts,
            error = %kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Grid fetch aborted"
        );

        FetchError {
            index,
            lat: point.latitude,
            lon: point.longitude,
            attempts,
            kind,
        }
    }
}

/// Fetch one point, retrying retryable failures with exponential backoff.
///
/// On failure returns the number of attempts made with the last error.
async fn fetch_with_retry<S>(
    source: &S,
    lat: f64,
    lon: f64,
    config: &FetchConfig,
) -> Result<f64, (u32, FetchErrorKind)>
where
    S: WeatherSource + ?Sized,
{
    let mut attempts = 0;
    let mut delay = config.initial_retry_delay;

    loop {
        attempts += 1;
        counter!("heatgrid_requests_total").increment(1);
        let started = Instant::now();

        match source.fetch_value(lat, lon).await {
            Ok(value) => {
                histogram!("heatgrid_request_duration_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                return Ok(value);
            }
            Err(kind) => {
                counter!("heatgrid_request_failures_total", "kind" => kind.label()).increment(1);

                if attempts > config.max_retries || !kind.is_retryable() {
                    return Err((attempts, kind));
                }

                warn!(
                    lat = lat,
                    lon = lon,
                    error = %kind,
                    retry = attempts,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Weather request failed, retrying"
                );
                counter!("heatgrid_request_retries_total").increment(1);

                tokio::time::sleep(delay).await;

                // Exponential backoff
                delay = std::cmp::min(delay * 2, config.max_retry_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use heatgrid_common::{generate_grid, BoundingBox};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory source: value = lat * 1000 + lon, with scripted delays and
    /// failures per coordinate.
    #[derive(Default)]
    struct ScriptedSource {
        delays: HashMap<String, Duration>,
        failures: HashMap<String, FetchErrorKind>,
        flaky: Mutex<HashMap<String, u32>>,
        panic_at: Option<String>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    fn key(lat: f64, lon: f64) -> String {
        format!("{}:{}", lat, lon)
    }

    fn expected(lat: f64, lon: f64) -> f64 {
        lat * 1000.0 + lon
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn fetch_value(&self, lat: f64, lon: f64) -> Result<f64, FetchErrorKind> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let k = key(lat, lon);
            if let Some(delay) = self.delays.get(&k) {
                tokio::time::sleep(*delay).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_at.as_deref() == Some(k.as_str()) {
                panic!("scripted panic");
            }
            if let Some(remaining) = self.flaky.lock().unwrap().get_mut(&k) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchErrorKind::Status(503));
                }
            }
            if let Some(kind) = self.failures.get(&k) {
                return Err(kind.clone());
            }
            Ok(expected(lat, lon))
        }
    }

    fn grid(n: usize) -> Vec<SamplePoint> {
        generate_grid(BoundingBox::new(-80.0, -180.0, 80.0, 180.0), n).unwrap()
    }

    fn fetcher(
        source: ScriptedSource,
        config: FetchConfig,
    ) -> (Arc<ScriptedSource>, GridFetcher<ScriptedSource>) {
        let source = Arc::new(source);
        (source.clone(), GridFetcher::new(source, config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_follow_point_order_not_completion_order() {
        let points = grid(4);
        let mut source = ScriptedSource::default();
        // Later points answer first.
        for (i, p) in points.iter().enumerate() {
            let delay = Duration::from_millis(10 * (points.len() - i) as u64);
            source.delays.insert(key(p.latitude, p.longitude), delay);
        }

        let (_, fetcher) = fetcher(source, FetchConfig::default());
        let fetched = fetcher.fetch_values(points.clone()).await.unwrap();

        assert_eq!(fetched.len(), points.len());
        for (before, after) in points.iter().zip(&fetched) {
            assert_eq!(before.latitude, after.latitude);
            assert_eq!(before.longitude, after.longitude);
            assert_eq!(after.value, expected(before.latitude, before.longitude));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_run_concurrently() {
        let points = grid(10);
        let mut source = ScriptedSource::default();
        for (i, p) in points.iter().enumerate() {
            let delay = Duration::from_millis(50 + (i as u64 % 10) * 50);
            source.delays.insert(key(p.latitude, p.longitude), delay);
        }

        let (source, fetcher) = fetcher(source, FetchConfig::default());
        let started = tokio::time::Instant::now();
        fetcher.fetch_values(points).await.unwrap();
        let elapsed = started.elapsed();

        // Slowest single request is 500ms; sequential would be 27.5s.
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(600), "took {:?}", elapsed);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_fails_batch() {
        let points = grid(5);
        let bad = points[7];
        let mut source = ScriptedSource::default();
        source.failures.insert(
            key(bad.latitude, bad.longitude),
            FetchErrorKind::MissingField("main.temp".to_string()),
        );

        let (_, fetcher) = fetcher(source, FetchConfig::default());
        let err = fetcher.fetch_values(points).await.unwrap_err();

        assert_eq!(err.index, 7);
        assert_eq!(err.lat, bad.latitude);
        assert_eq!(err.lon, bad.longitude);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.kind, FetchErrorKind::MissingField("main.temp".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_outstanding_requests() {
        let points = grid(3);
        let mut source = ScriptedSource::default();
        source
            .failures
            .insert(key(points[0].latitude, points[0].longitude), FetchErrorKind::Status(404));
        for p in &points[1..] {
            source
                .delays
                .insert(key(p.latitude, p.longitude), Duration::from_secs(3600));
        }

        let (_, fetcher) = fetcher(source, FetchConfig::default());
        let started = tokio::time::Instant::now();
        let err = fetcher.fetch_values(points).await.unwrap_err();

        assert_eq!(err.index, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_transient_failure() {
        let points = grid(2);
        let flaky = points[3];
        let source = ScriptedSource::default();
        source
            .flaky
            .lock()
            .unwrap()
            .insert(key(flaky.latitude, flaky.longitude), 2);

        let config = FetchConfig {
            max_retries: 2,
            ..FetchConfig::default()
        };
        let (source, fetcher) = fetcher(source, config);
        let fetched = fetcher.fetch_values(points).await.unwrap();

        assert_eq!(fetched[3].value, expected(flaky.latitude, flaky.longitude));
        // Four points, two extra attempts for the flaky one
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let points = grid(2);
        let flaky = points[1];
        let source = ScriptedSource::default();
        source
            .flaky
            .lock()
            .unwrap()
            .insert(key(flaky.latitude, flaky.longitude), 5);

        let config = FetchConfig {
            max_retries: 2,
            ..FetchConfig::default()
        };
        let (_, fetcher) = fetcher(source, config);
        let err = fetcher.fetch_values(points).await.unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.kind, FetchErrorKind::Status(503));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_not_retried() {
        let points = grid(1);
        let mut source = ScriptedSource::default();
        source.failures.insert(
            key(points[0].latitude, points[0].longitude),
            FetchErrorKind::Parse("expected value".to_string()),
        );

        let config = FetchConfig {
            max_retries: 4,
            ..FetchConfig::default()
        };
        let (source, fetcher) = fetcher(source, config);
        let err = fetcher.fetch_values(points).await.unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let points = grid(6);
        let config = FetchConfig {
            max_concurrent: Some(4),
            ..FetchConfig::default()
        };
        let (source, fetcher) = fetcher(ScriptedSource::default(), config);
        let fetched = fetcher.fetch_values(points).await.unwrap();

        assert_eq!(fetched.len(), 36);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_limits_are_clamped() {
        for limit in [0, usize::MAX] {
            let config = FetchConfig {
                max_concurrent: Some(limit),
                ..FetchConfig::default()
            };
            let (_, fetcher) = fetcher(ScriptedSource::default(), config);
            let fetched = fetcher.fetch_values(grid(2)).await.unwrap();
            assert_eq!(fetched.len(), 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_reports_its_point() {
        let points = grid(3);
        let bad = points[5];
        let source = ScriptedSource {
            panic_at: Some(key(bad.latitude, bad.longitude)),
            ..ScriptedSource::default()
        };

        let (_, fetcher) = fetcher(source, FetchConfig::default());
        let err = fetcher.fetch_values(points).await.unwrap_err();

        assert_eq!(err.index, 5);
        assert!(matches!(err.kind, FetchErrorKind::Task(_)));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (_, fetcher) = fetcher(ScriptedSource::default(), FetchConfig::default());
        assert!(fetcher.fetch_values(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_grid() {
        let spec = GridSpec::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 3).unwrap();
        let (_, fetcher) = fetcher(ScriptedSource::default(), FetchConfig::default());
        let fetched = fetcher.sample_grid(&spec).await.unwrap();

        assert_eq!(fetched.len(), 9);
        assert_eq!(fetched[4].value, expected(fetched[4].latitude, fetched[4].longitude));
    }
}
