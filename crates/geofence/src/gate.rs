//! The geofence gate: classify a reading against a reference point.

use serde::{Deserialize, Serialize};

use crate::{Coordinate, GeofenceError, haversine_meters};

/// Radius used when the integrator does not configure one.
pub const DEFAULT_THRESHOLD_METERS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Within,
    Outside,
}

/// Outcome of a single evaluation. The distance is always reported so callers
/// can display it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeofenceResult {
    pub classification: Classification,
    pub distance_meters: f64,
}

impl GeofenceResult {
    pub fn is_within(&self) -> bool {
        self.classification == Classification::Within
    }
}

/// Classify `reading` against `reference`.
///
/// `Within` iff the great-circle distance is strictly below `threshold_meters`.
///
/// - No IO
/// - No panics
pub fn evaluate(
    reading: Coordinate,
    reference: Coordinate,
    threshold_meters: f64,
) -> Result<GeofenceResult, GeofenceError> {
    validate_threshold(threshold_meters)?;

    let result = classify(haversine_meters(reading, reference), threshold_meters);

    tracing::debug!(
        %reading,
        %reference,
        distance_meters = result.distance_meters,
        threshold_meters,
        classification = ?result.classification,
        "geofence evaluated"
    );

    Ok(result)
}

fn classify(distance_meters: f64, threshold_meters: f64) -> GeofenceResult {
    let classification = if distance_meters < threshold_meters {
        Classification::Within
    } else {
        Classification::Outside
    };
    GeofenceResult {
        classification,
        distance_meters,
    }
}

fn validate_threshold(threshold_meters: f64) -> Result<(), GeofenceError> {
    if threshold_meters.is_finite() && threshold_meters > 0.0 {
        Ok(())
    } else {
        Err(GeofenceError::InvalidThreshold(threshold_meters))
    }
}

/// A configured geofence: reference point plus radius.
///
/// Both values are configuration; nothing here hard-codes a campus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geofence {
    reference: Coordinate,
    threshold_meters: f64,
}

impl Geofence {
    pub fn new(reference: Coordinate, threshold_meters: f64) -> Result<Self, GeofenceError> {
        validate_threshold(threshold_meters)?;
        Ok(Self {
            reference,
            threshold_meters,
        })
    }

    pub fn with_default_threshold(reference: Coordinate) -> Self {
        Self {
            reference,
            threshold_meters: DEFAULT_THRESHOLD_METERS,
        }
    }

    pub fn reference(&self) -> Coordinate {
        self.reference
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    /// Infallible: both the reading and the configured radius are already validated.
    pub fn evaluate(&self, reading: Coordinate) -> GeofenceResult {
        classify(haversine_meters(reading, self.reference), self.threshold_meters)
    }

    /// Evaluate an unvalidated `(latitude, longitude)` pair.
    pub fn evaluate_raw(&self, latitude: f64, longitude: f64) -> Result<GeofenceResult, GeofenceError> {
        let reading = Coordinate::new(latitude, longitude)?;
        evaluate(reading, self.reference, self.threshold_meters)
    }
}
