//! Common test fixtures for heatgrid tests.

/// Common bounding boxes as (start_lat, start_lng, end_lat, end_lng).
pub mod bbox {
    /// Inhabited latitudes, all longitudes
    pub const WORLD: (f64, f64, f64, f64) = (-80.0, -180.0, 80.0, 180.0);

    /// Continental United States
    pub const CONUS: (f64, f64, f64, f64) = (20.0, -130.0, 55.0, -60.0);
}
