//! Weather sources: where a single point's value comes from.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use heatgrid_common::{HeatgridError, HeatgridResult};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::FetchErrorKind;

/// OpenWeatherMap current weather, metric units.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://api.openweathermap.org/data/2.5/weather?units=metric&lat={lat}&lon={lon}&appid={key}";

/// Field holding the temperature in a current weather response.
pub const DEFAULT_VALUE_PATH: &str = "main.temp";

/// Trait for anything that can produce a scalar for a coordinate.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch the value at (lat, lon).
    async fn fetch_value(&self, lat: f64, lon: f64) -> Result<f64, FetchErrorKind>;
}

/// A request URL with `{lat}`, `{lon}` and optional `{key}` placeholders.
#[derive(Clone)]
pub struct UrlTemplate {
    template: String,
    api_key: String,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>, api_key: impl Into<String>) -> HeatgridResult<Self> {
        let template = template.into();
        let api_key = api_key.into();

        for placeholder in ["{lat}", "{lon}"] {
            if !template.contains(placeholder) {
                return Err(HeatgridError::invalid_parameter(
                    "url_template",
                    format!("missing {} placeholder", placeholder),
                ));
            }
        }
        if template.contains(KEY_PLACEHOLDER) {
            if api_key.trim().is_empty() {
                return Err(HeatgridError::MissingParameter("api_key".to_string()));
            }
            let parsed = Url::parse(&fill_coords(&template, 0.0, 0.0)).map_err(|e| {
                HeatgridError::invalid_parameter("url_template", e.to_string())
            })?;
            if !parsed.query_pairs().any(|(_, value)| value == KEY_PLACEHOLDER) {
                return Err(HeatgridError::invalid_parameter(
                    "url_template",
                    "{key} must be a whole query parameter value",
                ));
            }
        }

        Ok(Self { template, api_key })
    }

    /// Build the request URL for a coordinate.
    ///
    /// The key is form-encoded into its query parameter, so keys containing
    /// `&`, `#` or `=` survive intact.
    pub fn render(&self, lat: f64, lon: f64) -> String {
        let url = fill_coords(&self.template, lat, lon);
        if !self.template.contains(KEY_PLACEHOLDER) {
            return url;
        }

        let Ok(mut parsed) = Url::parse(&url) else {
            return url;
        };
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(name, value)| {
                let value = if value == KEY_PLACEHOLDER {
                    self.api_key.clone()
                } else {
                    value.into_owned()
                };
                (name.into_owned(), value)
            })
            .collect();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
        parsed.into()
    }
}

const KEY_PLACEHOLDER: &str = "{key}";

fn fill_coords(template: &str, lat: f64, lon: f64) -> String {
    template
        .replace("{lat}", &lat.to_string())
        .replace("{lon}", &lon.to_string())
}

// Never print the key.
impl std::fmt::Debug for UrlTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlTemplate")
            .field("template", &self.template)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Dotted path to the numeric field in a JSON response, e.g. `main.temp`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePath {
    path: String,
    pointer: String,
}

impl ValuePath {
    pub fn parse(path: &str) -> HeatgridResult<Self> {
        let path = path.trim();
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(HeatgridError::invalid_parameter(
                "value_path",
                format!("'{}' is not a dotted field path", path),
            ));
        }

        // JSON pointer segments escape '~' and '/' (RFC 6901)
        let pointer = path.split('.').fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(&segment.replace('~', "~0").replace('/', "~1"));
            acc
        });

        Ok(Self {
            path: path.to_string(),
            pointer,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Pull the number at this path out of a response body.
    pub fn extract(&self, body: &Value) -> Result<f64, FetchErrorKind> {
        match body.pointer(&self.pointer) {
            None | Some(Value::Null) => Err(FetchErrorKind::MissingField(self.path.clone())),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| FetchErrorKind::NotNumeric {
                field: self.path.clone(),
                found: n.to_string(),
            }),
            Some(other) => Err(FetchErrorKind::NotNumeric {
                field: self.path.clone(),
                found: other.to_string(),
            }),
        }
    }
}

impl Default for ValuePath {
    fn default() -> Self {
        Self {
            path: DEFAULT_VALUE_PATH.to_string(),
            pointer: "/main/temp".to_string(),
        }
    }
}

/// Configuration for the HTTP weather source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub url_template: UrlTemplate,
    pub value_path: ValuePath,
    /// Whole-request timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// Weather source backed by an HTTP JSON API.
pub struct HttpWeatherSource {
    client: Client,
    url_template: UrlTemplate,
    value_path: ValuePath,
}

impl HttpWeatherSource {
    /// Create a source with its own pooled client.
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, config))
    }

    /// Create a source sharing an existing client.
    pub fn with_client(client: Client, config: HttpSourceConfig) -> Self {
        Self {
            client,
            url_template: config.url_template,
            value_path: config.value_path,
        }
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_value(&self, lat: f64, lon: f64) -> Result<f64, FetchErrorKind> {
        let url = self.url_template.render(lat, lon);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "Weather request rejected");
            return Err(FetchErrorKind::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let json: Value =
            serde_json::from_slice(&body).map_err(|e| FetchErrorKind::Parse(e.to_string()))?;

        let value = self.value_path.extract(&json)?;
        debug!(value = value, field = %self.value_path.as_str(), "Weather value received");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_default_template() {
        let template = UrlTemplate::new(DEFAULT_URL_TEMPLATE, "abc123").unwrap();
        assert_eq!(
            template.render(-80.0, -162.5),
            "https://api.openweathermap.org/data/2.5/weather?units=metric&lat=-80&lon=-162.5&appid=abc123"
        );
    }

    #[test]
    fn test_template_requires_placeholders() {
        assert!(UrlTemplate::new("http://x/weather?lat={lat}", "k").is_err());
        assert!(UrlTemplate::new("http://x/weather?lon={lon}", "k").is_err());
    }

    #[test]
    fn test_template_requires_key_when_referenced() {
        assert_eq!(
            UrlTemplate::new(DEFAULT_URL_TEMPLATE, "  ").unwrap_err(),
            HeatgridError::MissingParameter("api_key".to_string())
        );
        assert!(UrlTemplate::new("http://x/w?lat={lat}&lon={lon}", "").is_ok());
    }

    #[test]
    fn test_render_encodes_key() {
        let template = UrlTemplate::new(DEFAULT_URL_TEMPLATE, "a&b=c#d").unwrap();
        let url = Url::parse(&template.render(10.0, 20.0)).unwrap();

        let appid: Vec<_> = url
            .query_pairs()
            .filter(|(name, _)| name == "appid")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(appid, vec!["a&b=c#d".to_string()]);
        assert_eq!(url.fragment(), None);
        assert!(url.query_pairs().any(|(name, value)| name == "lat" && value == "10"));
    }

    #[test]
    fn test_key_placeholder_must_be_query_value() {
        assert!(UrlTemplate::new("http://x/{key}/w?lat={lat}&lon={lon}", "k").is_err());
        assert!(UrlTemplate::new("not a url?lat={lat}&lon={lon}&appid={key}", "k").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let template = UrlTemplate::new(DEFAULT_URL_TEMPLATE, "supersecret").unwrap();
        assert!(!format!("{:?}", template).contains("supersecret"));
    }

    #[test]
    fn test_extract_default_path() {
        let body = json!({"main": {"temp": 21.5, "humidity": 56}});
        assert_eq!(ValuePath::default().extract(&body), Ok(21.5));
    }

    #[test]
    fn test_extract_integer_value() {
        let path = ValuePath::parse("main.humidity").unwrap();
        assert_eq!(path.extract(&json!({"main": {"humidity": 56}})), Ok(56.0));
    }

    #[test]
    fn test_extract_missing_and_null() {
        let path = ValuePath::default();
        assert_eq!(
            path.extract(&json!({"main": {}})),
            Err(FetchErrorKind::MissingField("main.temp".to_string()))
        );
        assert_eq!(
            path.extract(&json!({"main": {"temp": null}})),
            Err(FetchErrorKind::MissingField("main.temp".to_string()))
        );
        assert_eq!(
            path.extract(&json!({"cod": 200})),
            Err(FetchErrorKind::MissingField("main.temp".to_string()))
        );
    }

    #[test]
    fn test_extract_non_numeric() {
        let result = ValuePath::default().extract(&json!({"main": {"temp": "warm"}}));
        assert!(matches!(result, Err(FetchErrorKind::NotNumeric { .. })));
    }

    #[test]
    fn test_extract_escapes_pointer_characters() {
        let body = json!({"rain": {"1h/mm": 0.4, "1h": {"mm": 9.0}}, "a~b": {"c": 2}});
        assert_eq!(ValuePath::parse("rain.1h/mm").unwrap().extract(&body), Ok(0.4));
        assert_eq!(ValuePath::parse("a~b.c").unwrap().extract(&body), Ok(2.0));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(ValuePath::parse("").is_err());
        assert!(ValuePath::parse("main..temp").is_err());
        assert_eq!(ValuePath::parse(" wind.speed ").unwrap().as_str(), "wind.speed");
    }
}
