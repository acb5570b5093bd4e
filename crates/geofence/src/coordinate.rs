//! Geographic coordinate value object.

use serde::{Deserialize, Serialize};

use rollcall_core::ValueObject;

use crate::GeofenceError;

/// A validated `(latitude, longitude)` pair in decimal degrees.
///
/// Construction always goes through [`Coordinate::new`] (deserialization
/// included), so a `Coordinate` in hand is finite and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = GeofenceError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeofenceError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(GeofenceError::malformed(format!(
                "non-finite coordinate ({latitude}, {longitude})"
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeofenceError::malformed(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeofenceError::malformed(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl ValueObject for Coordinate {}

impl core::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}
