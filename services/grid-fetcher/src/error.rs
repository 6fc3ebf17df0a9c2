//! Fetch error types.

use thiserror::Error;

/// Why a single weather request failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchErrorKind {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Parse(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is not a number: {found}")]
    NotNumeric { field: String, found: String },

    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchErrorKind {
    /// Whether trying the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchErrorKind::Transport(_) | FetchErrorKind::Timeout => true,
            FetchErrorKind::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Label used on failure metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchErrorKind::Transport(_) => "transport",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Status(_) => "status",
            FetchErrorKind::Parse(_) => "parse",
            FetchErrorKind::MissingField(_) => "missing_field",
            FetchErrorKind::NotNumeric { .. } => "not_numeric",
            FetchErrorKind::Task(_) => "task",
        }
    }
}

impl From<reqwest::Error> for FetchErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchErrorKind::Timeout
        } else {
            // The URL carries the API key
            FetchErrorKind::Transport(err.without_url().to_string())
        }
    }
}

/// A grid fetch that failed, naming the point that caused it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fetch failed for point {index} (lat {lat}, lon {lon}) after {attempts} attempt(s): {kind}")]
pub struct FetchError {
    /// Position of the point in the grid sequence
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub attempts: u32,
    #[source]
    pub kind: FetchErrorKind,
}
