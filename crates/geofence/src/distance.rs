//! Great-circle distance.

use crate::Coordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_MEAN_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine great-circle distance between two coordinates, in meters.
pub fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude().to_radians();
    let lat_b = b.latitude().to_radians();
    let d_lat = lat_b - lat_a;
    let d_lng = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    // Rounding can push `h` a hair above 1 for antipodal points.
    2.0 * EARTH_MEAN_RADIUS_METERS * h.sqrt().min(1.0).asin()
}
