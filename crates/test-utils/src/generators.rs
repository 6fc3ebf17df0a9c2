//! Synthetic weather values with a predictable shape.
//!
//! Mock services and the assertions against them share these functions, so
//! a test can recompute the value any coordinate should have received.

use serde_json::{json, Value};

/// Temperature in Celsius for a coordinate.
///
/// Warm at the equator, cooling towards the poles, with a small longitude
/// term so no two grid points share a value.
///
/// # Example
///
/// ```
/// use test_utils::mock_temperature;
///
/// assert_eq!(mock_temperature(0.0, 0.0), 30.0);
/// assert_eq!(mock_temperature(-60.0, 0.0), 0.0);
/// ```
pub fn mock_temperature(lat: f64, lng: f64) -> f64 {
    30.0 - lat.abs() * 0.5 + lng / 100.0
}

/// Relative humidity in percent for a coordinate.
pub fn mock_humidity(lat: f64, lng: f64) -> f64 {
    (50.0 + lat / 4.0 + lng / 10.0).clamp(0.0, 100.0)
}

/// A current-weather JSON body for a coordinate.
pub fn weather_body(lat: f64, lng: f64) -> Value {
    weather_body_with_temp(lat, lng, mock_temperature(lat, lng))
}

/// A current-weather JSON body carrying a specific temperature.
pub fn weather_body_with_temp(lat: f64, lng: f64, temp: f64) -> Value {
    json!({
        "coord": { "lon": lng, "lat": lat },
        "main": {
            "temp": temp,
            "humidity": mock_humidity(lat, lng),
            "pressure": 1013
        },
        "wind": { "speed": 3.6, "deg": 220 },
        "cod": 200
    })
}
