use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a live reading could not be obtained.
///
/// Every variant means "cannot determine location", which callers must present
/// differently from a confirmed off-premises reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The user (or platform) refused location access.
    PermissionDenied,
    /// No fix arrived before the acquisition timeout.
    TimedOut,
    /// The sensor answered with a fix older than the allowed maximum age.
    Stale,
    /// The sensor reported a failure of its own.
    SensorFailure,
}

impl UnavailableReason {
    /// User-facing explanation.
    pub fn message(self) -> &'static str {
        match self {
            UnavailableReason::PermissionDenied => {
                "Location access was denied. Allow location access to mark attendance."
            }
            UnavailableReason::TimedOut => {
                "Could not determine your location in time. Please try again."
            }
            UnavailableReason::Stale => {
                "Your last known location is too old. Please try again."
            }
            UnavailableReason::SensorFailure => {
                "Your device could not determine its location. Please try again."
            }
        }
    }
}

impl core::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            UnavailableReason::PermissionDenied => "permission denied",
            UnavailableReason::TimedOut => "timed out",
            UnavailableReason::Stale => "stale fix",
            UnavailableReason::SensorFailure => "sensor failure",
        };
        f.write_str(s)
    }
}

/// Geofence gate error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeofenceError {
    /// Input validation failure; never silently coerced.
    #[error("malformed coordinate: {0}")]
    MalformedCoordinate(String),

    #[error("invalid geofence threshold: {0} m")]
    InvalidThreshold(f64),

    /// Recoverable by retrying the acquisition.
    #[error("location unavailable: {0}")]
    LocationUnavailable(UnavailableReason),
}

impl GeofenceError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCoordinate(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GeofenceError::LocationUnavailable(_))
    }
}

impl From<UnavailableReason> for GeofenceError {
    fn from(reason: UnavailableReason) -> Self {
        Self::LocationUnavailable(reason)
    }
}
