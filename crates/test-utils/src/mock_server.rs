//! In-process mock of an OpenWeatherMap-style current weather endpoint.
//!
//! Serves `GET /data/2.5/weather?lat=..&lon=..&appid=..` on a random local
//! port. Individual coordinates can be made to fail, permanently or for a
//! number of attempts, and the server tracks how many requests were in
//! flight at once.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::generators::weather_body;

/// Path the mock serves current weather on.
pub const WEATHER_PATH: &str = "/data/2.5/weather";

/// How a coordinate misbehaves.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    /// Respond with this HTTP status and an error body
    Status(u16),
    /// Respond 200 with a body that is not JSON
    MalformedBody,
    /// Respond 200 with JSON lacking `main.temp`
    MissingField,
    /// Respond 200 with `main.temp` as a string
    NonNumeric,
    /// Never respond within any reasonable timeout
    Hang,
}

/// Builder for [`MockWeatherServer`].
#[derive(Debug, Default)]
pub struct MockWeatherServerBuilder {
    api_key: Option<String>,
    delay: Duration,
    failures: HashMap<String, MockFailure>,
    flaky: HashMap<String, usize>,
}

impl MockWeatherServerBuilder {
    /// Require `appid` to equal this key; requests without it get 401.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Delay every response by this long.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every request for (lat, lon) fail.
    pub fn fail_at(mut self, lat: f64, lon: f64, failure: MockFailure) -> Self {
        self.failures.insert(coord_key(lat, lon), failure);
        self
    }

    /// Answer the first `attempts` requests for (lat, lon) with 503.
    pub fn flaky_at(mut self, lat: f64, lon: f64, attempts: usize) -> Self {
        self.flaky.insert(coord_key(lat, lon), attempts);
        self
    }

    /// Bind to a random local port and start serving.
    pub async fn start(self) -> MockWeatherServer {
        let state = Arc::new(MockState {
            api_key: self.api_key,
            delay: self.delay,
            failures: self.failures,
            flaky: Mutex::new(self.flaky),
            requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route(WEATHER_PATH, get(current_weather))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock weather server");
        let addr = listener
            .local_addr()
            .expect("Mock weather server has no local address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        MockWeatherServer {
            addr,
            state,
            handle,
        }
    }
}

/// A running mock weather server. Stops when dropped.
#[derive(Debug)]
pub struct MockWeatherServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockWeatherServer {
    pub fn builder() -> MockWeatherServerBuilder {
        MockWeatherServerBuilder::default()
    }

    /// Start a server with no failures, no delay and no key check.
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL template pointing at this server, with `{lat}`, `{lon}` and
    /// `{key}` placeholders.
    pub fn url_template(&self) -> String {
        format!(
            "http://{}{}?units=metric&lat={{lat}}&lon={{lon}}&appid={{key}}",
            self.addr, WEATHER_PATH
        )
    }

    /// Total requests received so far.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were being served at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for MockWeatherServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct MockState {
    api_key: Option<String>,
    delay: Duration,
    failures: HashMap<String, MockFailure>,
    flaky: Mutex<HashMap<String, usize>>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn coord_key(lat: f64, lon: f64) -> String {
    format!("{}:{}", lat, lon)
}

async fn current_weather(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let response = respond(&state, &params).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

async fn respond(state: &MockState, params: &HashMap<String, String>) -> Response {
    if let Some(key) = &state.api_key {
        if params.get("appid") != Some(key) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"cod": 401, "message": "Invalid API key."})),
            )
                .into_response();
        }
    }

    let coord = |name: &str| params.get(name).and_then(|v| v.parse::<f64>().ok());
    let (lat, lon) = match (coord("lat"), coord("lon")) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"cod": "400", "message": "wrong latitude or longitude"})),
            )
                .into_response();
        }
    };

    let key = coord_key(lat, lon);

    {
        let mut flaky = state.flaky.lock().expect("flaky map poisoned");
        if let Some(remaining) = flaky.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"cod": 503, "message": "try again"})),
                )
                    .into_response();
            }
        }
    }

    match state.failures.get(&key) {
        Some(MockFailure::Status(code)) => {
            let status =
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({"cod": code, "message": "mock failure"}))).into_response()
        }
        Some(MockFailure::MalformedBody) => (StatusCode::OK, "<html>oops</html>").into_response(),
        Some(MockFailure::MissingField) => {
            Json(json!({"coord": {"lon": lon, "lat": lat}, "main": {}})).into_response()
        }
        Some(MockFailure::NonNumeric) => Json(json!({"main": {"temp": "warm"}})).into_response(),
        Some(MockFailure::Hang) => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        None => Json(weather_body(lat, lon)).into_response(),
    }
}
