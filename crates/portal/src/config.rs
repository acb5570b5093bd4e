//! Portal configuration from environment variables.

use std::time::Duration;

use thiserror::Error;

use rollcall_auth::{GuardPolicy, SessionConfig};
use rollcall_geofence::{
    AcquisitionOptions, Coordinate, DEFAULT_THRESHOLD_METERS, Geofence, GeofenceError,
};

pub const CAMPUS_LAT: &str = "ROLLCALL_CAMPUS_LAT";
pub const CAMPUS_LNG: &str = "ROLLCALL_CAMPUS_LNG";
pub const GEOFENCE_RADIUS_M: &str = "ROLLCALL_GEOFENCE_RADIUS_M";
pub const LOCATION_TIMEOUT_SECS: &str = "ROLLCALL_LOCATION_TIMEOUT_SECS";
pub const LOCATION_MAX_AGE_SECS: &str = "ROLLCALL_LOCATION_MAX_AGE_SECS";
pub const ADMIN_BYPASSES_APPROVAL: &str = "ROLLCALL_ADMIN_BYPASSES_APPROVAL";
pub const DEMO_SKIPS_APPROVAL: &str = "ROLLCALL_DEMO_SKIPS_APPROVAL";
pub const SESSION_LOOKUP_ATTEMPTS: &str = "ROLLCALL_SESSION_LOOKUP_ATTEMPTS";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid geofence: {0}")]
    Geofence(#[from] GeofenceError),
}

/// Everything the portal needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    pub geofence: Geofence,
    pub acquisition: AcquisitionOptions,
    pub policy: GuardPolicy,
    pub session: SessionConfig,
}

impl PortalConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (the process environment in production, a
    /// map in tests).
    ///
    /// The campus coordinate is required; everything else has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let latitude: f64 = required(&lookup, CAMPUS_LAT, "a latitude in degrees")?;
        let longitude: f64 = required(&lookup, CAMPUS_LNG, "a longitude in degrees")?;
        let reference = Coordinate::new(latitude, longitude)?;

        let radius = optional(&lookup, GEOFENCE_RADIUS_M, "meters", DEFAULT_THRESHOLD_METERS)?;
        let geofence = Geofence::new(reference, radius)?;

        let defaults = AcquisitionOptions::default();
        let acquisition = AcquisitionOptions {
            timeout: Duration::from_secs(optional(
                &lookup,
                LOCATION_TIMEOUT_SECS,
                "whole seconds",
                defaults.timeout.as_secs(),
            )?),
            maximum_age: Duration::from_secs(optional(
                &lookup,
                LOCATION_MAX_AGE_SECS,
                "whole seconds",
                defaults.maximum_age.as_secs(),
            )?),
        };

        let policy_defaults = GuardPolicy::default();
        let policy = GuardPolicy {
            admin_bypasses_approval: flag(
                &lookup,
                ADMIN_BYPASSES_APPROVAL,
                policy_defaults.admin_bypasses_approval,
            )?,
            demo_skips_approval: flag(
                &lookup,
                DEMO_SKIPS_APPROVAL,
                policy_defaults.demo_skips_approval,
            )?,
        };

        let session_defaults = SessionConfig::default();
        let attempts: u32 = optional(
            &lookup,
            SESSION_LOOKUP_ATTEMPTS,
            "a positive integer",
            session_defaults.lookup_attempts,
        )?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                key: SESSION_LOOKUP_ATTEMPTS,
                value: attempts.to_string(),
                expected: "a positive integer",
            });
        }
        let session = session_defaults.with_lookup_attempts(attempts);

        Ok(Self {
            geofence,
            acquisition,
            policy,
            session,
        })
    }
}

fn required<F, T>(lookup: &F, key: &'static str, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
{
    let raw = lookup(key).ok_or(ConfigError::Missing(key))?;
    parse(key, raw, expected)
}

fn optional<F, T>(
    lookup: &F,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr + core::fmt::Debug,
{
    match lookup(key) {
        Some(raw) => parse(key, raw, expected),
        None => {
            tracing::debug!(key, ?default, "not set; using default");
            Ok(default)
        }
    }
}

fn flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            expected: "a boolean",
        }),
    }
}

fn parse<T>(key: &'static str, raw: String, expected: &'static str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
{
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw,
        expected,
    })
}
