//! Attendance check-in: acquire a reading, then run the gate.

use rollcall_core::Scope;

use crate::{
    AcquisitionOptions, Classification, Geofence, GeofenceError, GeofenceResult, LocationRequest,
    LocationSensor,
};

/// Result of a check-in that produced a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckIn {
    /// Attendance may be marked.
    OnPremises(GeofenceResult),
    /// Confirmed not on premises.
    OffPremises(GeofenceResult),
}

impl CheckIn {
    pub fn result(&self) -> GeofenceResult {
        match self {
            CheckIn::OnPremises(r) | CheckIn::OffPremises(r) => *r,
        }
    }

    pub fn may_mark_attendance(&self) -> bool {
        matches!(self, CheckIn::OnPremises(_))
    }

    pub fn message(&self) -> String {
        match self {
            CheckIn::OnPremises(r) => format!(
                "You are on campus ({} away). Attendance can be marked.",
                format_distance(r.distance_meters)
            ),
            CheckIn::OffPremises(r) => format!(
                "You are {} from campus. Attendance can only be marked on campus.",
                format_distance(r.distance_meters)
            ),
        }
    }
}

impl From<GeofenceResult> for CheckIn {
    fn from(result: GeofenceResult) -> Self {
        match result.classification {
            Classification::Within => CheckIn::OnPremises(result),
            Classification::Outside => CheckIn::OffPremises(result),
        }
    }
}

/// Meters below 1 km, kilometers with one decimal above.
pub fn format_distance(meters: f64) -> String {
    let rounded = meters.round();
    if rounded < 1000.0 {
        format!("{:.0} m", rounded)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// Geofence plus acquisition bounds, as configured for the portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceGate {
    geofence: Geofence,
    options: AcquisitionOptions,
}

impl AttendanceGate {
    pub fn new(geofence: Geofence, options: AcquisitionOptions) -> Self {
        Self { geofence, options }
    }

    pub fn geofence(&self) -> &Geofence {
        &self.geofence
    }

    pub fn options(&self) -> AcquisitionOptions {
        self.options
    }

    /// Acquire a reading and classify it.
    ///
    /// Returns `None` when `scope` is cancelled before the check-in completes;
    /// the sensor is still released in that case. `LocationUnavailable` errors
    /// never reach the gate.
    pub async fn check_in(
        &self,
        sensor: &dyn LocationSensor,
        scope: &Scope,
    ) -> Option<Result<CheckIn, GeofenceError>> {
        let outcome = scope
            .run(async {
                let mut request = LocationRequest::new(sensor, self.options);
                request.resolve().await;
                request.reading()
            })
            .await?;

        let result = outcome.map(|reading| CheckIn::from(self.geofence.evaluate(reading)));
        match &result {
            Ok(check_in) => tracing::info!(
                distance_meters = check_in.result().distance_meters,
                on_premises = check_in.may_mark_attendance(),
                "attendance check-in evaluated"
            ),
            Err(err) => tracing::warn!(error = %err, "attendance check-in without a reading"),
        }
        Some(result)
    }
}
