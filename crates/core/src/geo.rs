//! Great-circle distance between two coordinates.

use std::f64::consts::PI;

/// Nautical miles per degree of arc, converted to statute miles.
const STATUTE_MILES_PER_DEGREE: f64 = 60.0 * 1.1515;
const KM_PER_STATUTE_MILE: f64 = 1.609344;

/// Distance in kilometres between two points given in decimal degrees.
///
/// Uses the spherical law of cosines. The cosine sum is clamped to `[-1, 1]`
/// so identical or antipodal inputs never leave the domain of `acos`.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rad_lat1 = PI * lat1 / 180.0;
    let rad_lat2 = PI * lat2 / 180.0;
    let rad_theta = PI * (lon1 - lon2) / 180.0;

    let sum = rad_lat1.sin() * rad_lat2.sin()
        + rad_lat1.cos() * rad_lat2.cos() * rad_theta.cos();

    let degrees = sum.clamp(-1.0, 1.0).acos() * 180.0 / PI;
    degrees * STATUTE_MILES_PER_DEGREE * KM_PER_STATUTE_MILE
}
