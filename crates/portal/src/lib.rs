//! `rollcall-portal` — wires configuration, the session service, the access
//! guard and the attendance gate together for a front end to drive.

pub mod config;

use std::sync::Arc;

use anyhow::Context;

use rollcall_auth::{
    Decision, Destination, IdentityProvider, Navigation, SessionError, SessionService,
    SessionState, navigate,
};
use rollcall_core::Scope;
use rollcall_geofence::{AttendanceGate, CheckIn, GeofenceError, LocationSensor};

pub use config::{ConfigError, PortalConfig};

/// The running portal.
#[derive(Debug)]
pub struct Portal {
    config: PortalConfig,
    sessions: SessionService,
    attendance: AttendanceGate,
}

impl Portal {
    /// Start the portal around an identity backend.
    ///
    /// Must be called from within a Tokio runtime (the session service spawns
    /// its change listener).
    pub fn start(config: PortalConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        let sessions = SessionService::start(identity, config.session);
        let attendance = AttendanceGate::new(config.geofence, config.acquisition);
        tracing::info!(
            campus = %config.geofence.reference(),
            radius_meters = config.geofence.threshold_meters(),
            admin_bypasses_approval = config.policy.admin_bypasses_approval,
            demo_skips_approval = config.policy.demo_skips_approval,
            "portal started"
        );
        Self {
            config,
            sessions,
            attendance,
        }
    }

    /// Initialize logging, load configuration from the environment and start.
    pub fn bootstrap(identity: Arc<dyn IdentityProvider>) -> anyhow::Result<Self> {
        rollcall_observability::init();
        let config = PortalConfig::from_env().context("loading portal configuration")?;
        Ok(Self::start(config, identity))
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn attendance(&self) -> &AttendanceGate {
        &self.attendance
    }

    /// Navigation for `path` given the current snapshot (may be `Loading`).
    pub fn navigate(&self, path: &str) -> Navigation {
        navigate(&self.sessions.state(), path, &self.config.policy)
    }

    /// Navigation for `path` once the session has settled.
    ///
    /// `None` if `scope` is cancelled first.
    pub async fn navigate_settled(&self, path: &str, scope: &Scope) -> Option<Navigation> {
        let state = match scope.run(self.sessions.settled()).await? {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "session unavailable; navigating as anonymous");
                SessionState::Anonymous
            }
        };
        Some(navigate(&state, path, &self.config.policy))
    }

    /// Guard decision for `destination` once the session has settled.
    /// Unguarded destinations are always allowed.
    pub async fn decide(&self, destination: Destination, scope: &Scope) -> Option<Decision> {
        match destination.requirement() {
            None => Some(Decision::Allow),
            Some(requirement) => {
                self.sessions
                    .decide(&requirement, &self.config.policy, scope)
                    .await
            }
        }
    }

    /// Acquire a reading and run the attendance gate.
    pub async fn check_in(
        &self,
        sensor: &dyn LocationSensor,
        scope: &Scope,
    ) -> Option<Result<CheckIn, GeofenceError>> {
        self.attendance.check_in(sensor, scope).await
    }

    pub async fn sign_out(&self) -> Result<Destination, SessionError> {
        self.sessions.sign_out().await
    }

    pub fn shutdown(&self) {
        self.sessions.shutdown();
    }
}
