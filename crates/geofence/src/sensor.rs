//! Live location acquisition.
//!
//! The device sensor is an external collaborator. A [`LocationRequest`] drives
//! one single-shot acquisition through
//! `Idle -> Requesting -> {Resolved | Denied | TimedOut | Failed}` and holds a
//! lease on the sensor for exactly as long as the request is outstanding. The
//! lease is released on every exit path, including the request future being
//! dropped mid-flight.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Coordinate, GeofenceError, UnavailableReason};

/// Caller-supplied bounds for a single acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// How long to wait for a fix.
    pub timeout: Duration,
    /// Oldest acceptable fix (cached positions older than this are rejected).
    pub maximum_age: Duration,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(60),
        }
    }
}

impl AcquisitionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_maximum_age(mut self, maximum_age: Duration) -> Self {
        self.maximum_age = maximum_age;
        self
    }
}

/// A position reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
    pub accuracy_meters: Option<f64>,
}

impl PositionFix {
    pub fn new(coordinate: Coordinate, captured_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            captured_at,
            accuracy_meters: None,
        }
    }

    /// Age of the fix at `now`. Fixes stamped in the future count as fresh.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Failure reported by the sensor itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorFailure {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),
}

/// Device location sensor.
#[async_trait]
pub trait LocationSensor: Send + Sync {
    /// Ask for the current position. Implementations may honour
    /// `options.maximum_age` by answering from a cache.
    async fn current_position(&self, options: &AcquisitionOptions)
    -> Result<PositionFix, SensorFailure>;

    /// Release the underlying handle. Called once per acquisition, after the
    /// request finishes or is abandoned.
    fn release(&self);
}

/// Acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquisitionState {
    Idle,
    Requesting,
    Resolved(Coordinate),
    Denied,
    TimedOut,
    /// Stale fix or sensor-side failure.
    Failed(UnavailableReason),
}

impl AcquisitionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AcquisitionState::Idle | AcquisitionState::Requesting)
    }
}

/// Releases the sensor when dropped.
struct SensorLease<'a> {
    sensor: &'a dyn LocationSensor,
}

impl<'a> SensorLease<'a> {
    fn acquire(sensor: &'a dyn LocationSensor) -> Self {
        tracing::trace!("location sensor leased");
        Self { sensor }
    }
}

impl Drop for SensorLease<'_> {
    fn drop(&mut self) {
        self.sensor.release();
        tracing::trace!("location sensor released");
    }
}

/// One single-shot acquisition. There is no retry here; callers that want one
/// build a new request.
pub struct LocationRequest<'a> {
    sensor: &'a dyn LocationSensor,
    options: AcquisitionOptions,
    state: AcquisitionState,
}

impl<'a> LocationRequest<'a> {
    pub fn new(sensor: &'a dyn LocationSensor, options: AcquisitionOptions) -> Self {
        Self {
            sensor,
            options,
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Run the acquisition to a terminal state.
    ///
    /// Calling this again after a terminal state returns that state without
    /// touching the sensor.
    pub async fn resolve(&mut self) -> AcquisitionState {
        if self.state != AcquisitionState::Idle {
            return self.state;
        }
        self.state = AcquisitionState::Requesting;

        let lease = SensorLease::acquire(self.sensor);
        let outcome = tokio::time::timeout(
            self.options.timeout,
            self.sensor.current_position(&self.options),
        )
        .await;
        drop(lease);

        self.state = match outcome {
            Err(_elapsed) => {
                tracing::warn!(timeout = ?self.options.timeout, "location request timed out");
                AcquisitionState::TimedOut
            }
            Ok(Err(SensorFailure::PermissionDenied)) => {
                tracing::warn!("location permission denied");
                AcquisitionState::Denied
            }
            Ok(Err(SensorFailure::Unavailable(detail))) => {
                tracing::warn!(%detail, "location sensor failed");
                AcquisitionState::Failed(UnavailableReason::SensorFailure)
            }
            Ok(Ok(fix)) => {
                let age = fix.age(Utc::now());
                if age > self.options.maximum_age {
                    tracing::warn!(?age, maximum_age = ?self.options.maximum_age, "rejecting stale fix");
                    AcquisitionState::Failed(UnavailableReason::Stale)
                } else {
                    AcquisitionState::Resolved(fix.coordinate)
                }
            }
        };
        self.state
    }

    /// The resolved reading, or why there is none.
    pub fn reading(&self) -> Result<Coordinate, GeofenceError> {
        match self.state {
            AcquisitionState::Resolved(coordinate) => Ok(coordinate),
            AcquisitionState::Denied => Err(UnavailableReason::PermissionDenied.into()),
            AcquisitionState::TimedOut => Err(UnavailableReason::TimedOut.into()),
            AcquisitionState::Failed(reason) => Err(reason.into()),
            // Never resolved: the request was not run, or was abandoned mid-flight.
            AcquisitionState::Idle | AcquisitionState::Requesting => {
                Err(UnavailableReason::SensorFailure.into())
            }
        }
    }
}

/// Acquire a single reading.
pub async fn acquire_reading(
    sensor: &dyn LocationSensor,
    options: AcquisitionOptions,
) -> Result<Coordinate, GeofenceError> {
    let mut request = LocationRequest::new(sensor, options);
    request.resolve().await;
    request.reading()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::in_memory::{ScriptedSensor, SensorBehavior};

    fn campus() -> Coordinate {
        Coordinate::new(23.7957, 86.4304).unwrap()
    }

    fn fast() -> AcquisitionOptions {
        AcquisitionOptions::default().with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn defaults_are_ten_and_sixty_seconds() {
        let options = AcquisitionOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn resolved_fix_yields_reading_and_releases() {
        let sensor = ScriptedSensor::fixed(campus());
        let mut request = LocationRequest::new(&sensor, fast());
        assert_eq!(request.state(), AcquisitionState::Idle);

        let state = request.resolve().await;
        assert_eq!(state, AcquisitionState::Resolved(campus()));
        assert_eq!(request.reading().unwrap(), campus());
        assert_eq!(sensor.releases(), 1);
    }

    #[tokio::test]
    async fn denial_is_distinct_from_timeout() {
        let denied = ScriptedSensor::new(SensorBehavior::Deny);
        let err = acquire_reading(&denied, fast()).await.unwrap_err();
        assert_eq!(err, GeofenceError::LocationUnavailable(UnavailableReason::PermissionDenied));
        assert_eq!(denied.releases(), 1);

        let hanging = ScriptedSensor::new(SensorBehavior::Hang);
        let err = acquire_reading(&hanging, fast()).await.unwrap_err();
        assert_eq!(err, GeofenceError::LocationUnavailable(UnavailableReason::TimedOut));
        assert_eq!(hanging.releases(), 1);
    }

    #[tokio::test]
    async fn sensor_failure_is_unavailable() {
        let sensor = ScriptedSensor::new(SensorBehavior::Fail("no satellites".into()));
        let err = acquire_reading(&sensor, fast()).await.unwrap_err();
        assert_eq!(err, GeofenceError::LocationUnavailable(UnavailableReason::SensorFailure));
        assert_eq!(sensor.releases(), 1);
    }

    #[tokio::test]
    async fn stale_fix_is_rejected() {
        let old = PositionFix::new(campus(), Utc::now() - ChronoDuration::minutes(5));
        let sensor = ScriptedSensor::new(SensorBehavior::Fix(old));
        let err = acquire_reading(&sensor, fast()).await.unwrap_err();
        assert_eq!(err, GeofenceError::LocationUnavailable(UnavailableReason::Stale));
    }

    #[tokio::test]
    async fn terminal_request_does_not_touch_the_sensor_again() {
        let sensor = ScriptedSensor::fixed(campus());
        let mut request = LocationRequest::new(&sensor, fast());
        request.resolve().await;
        request.resolve().await;

        assert_eq!(sensor.requests(), 1);
        assert_eq!(sensor.releases(), 1);
    }

    #[tokio::test]
    async fn abandoned_request_still_releases() {
        let sensor = Arc::new(ScriptedSensor::new(SensorBehavior::Hang));
        let options = AcquisitionOptions::default();

        {
            let mut request = LocationRequest::new(sensor.as_ref(), options);
            let resolve = request.resolve();
            // Give up long before the sensor's own timeout.
            let _ = tokio::time::timeout(Duration::from_millis(20), resolve).await;
        }

        assert_eq!(sensor.requests(), 1);
        assert_eq!(sensor.releases(), 1);
    }

    #[test]
    fn future_stamped_fix_counts_as_fresh() {
        let now = Utc::now();
        let fix = PositionFix::new(campus(), now + ChronoDuration::seconds(5));
        assert_eq!(fix.age(now), Duration::ZERO);
    }
}
