use serde::Serialize;

/// Coordinates accepted by the matching flow, rounded to 6 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinates are not finite numbers")]
    NotFinite,
    #[error("latitude out of range [-90, 90]")]
    LatitudeOutOfRange,
    #[error("longitude out of range [-180, 180]")]
    LongitudeOutOfRange,
    #[error("coordinates carry more than 6 decimal digits")]
    ExcessivePrecision,
    #[error("null island (0, 0) is not a usable location")]
    NullIsland,
}

const PRECISION_FACTOR: f64 = 1_000_000.0; // 6 decimal digits

fn round6(v: f64) -> f64 {
    (v * PRECISION_FACTOR).round() / PRECISION_FACTOR
}

fn has_excessive_precision(v: f64) -> bool {
    // Anything beyond the 6th decimal is treated as device fingerprinting noise.
    let scaled = v * PRECISION_FACTOR;
    (scaled - scaled.round()).abs() > 1e-6
}

/// Total validation of a latitude/longitude pair. Never panics; either a
/// sanitized pair rounded to 6 decimals or the reason it was rejected.
pub fn validate(latitude: f64, longitude: f64) -> Result<Coordinates, CoordinateError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(CoordinateError::NotFinite);
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(CoordinateError::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(CoordinateError::LongitudeOutOfRange);
    }
    if has_excessive_precision(latitude) || has_excessive_precision(longitude) {
        return Err(CoordinateError::ExcessivePrecision);
    }
    if latitude == 0.0 && longitude == 0.0 {
        return Err(CoordinateError::NullIsland);
    }
    Ok(Coordinates {
        latitude: round6(latitude),
        longitude: round6(longitude),
    })
}

/// Haversine distance in meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6_371_000.0; // earth radius in meters
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    r * c
}

/// Approximate degree spans for a bounding-box SQL prefilter.
/// 1 degree of latitude is roughly 111km; longitude shrinks with latitude.
pub fn bounding_box_degrees(latitude: f64, radius_meters: f64) -> (f64, f64) {
    let lat_range = radius_meters / 111_000.0;
    let cos_lat = latitude.to_radians().cos().abs().max(0.01);
    let lon_range = radius_meters / (111_000.0 * cos_lat);
    (lat_range, lon_range)
}
