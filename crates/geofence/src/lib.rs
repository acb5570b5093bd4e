//! `rollcall-geofence` — on-premises check for attendance marking.
//!
//! The gate is a pure function over two coordinates and a radius. Acquiring
//! the live reading is delegated to a [`LocationSensor`] collaborator and runs
//! as a single, time-bounded request that always releases the sensor.

pub mod attendance;
pub mod coordinate;
pub mod distance;
pub mod error;
pub mod gate;
pub mod in_memory;
pub mod sensor;

pub use attendance::{AttendanceGate, CheckIn, format_distance};
pub use coordinate::Coordinate;
pub use distance::{EARTH_MEAN_RADIUS_METERS, haversine_meters};
pub use error::{GeofenceError, UnavailableReason};
pub use gate::{Classification, DEFAULT_THRESHOLD_METERS, Geofence, GeofenceResult, evaluate};
pub use in_memory::{ScriptedSensor, SensorBehavior};
pub use sensor::{
    AcquisitionOptions, AcquisitionState, LocationRequest, LocationSensor, PositionFix,
    SensorFailure, acquire_reading,
};
