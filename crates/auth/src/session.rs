//! Process-wide session service.
//!
//! The service is the single owner of the current principal. It is built
//! explicitly around an injected [`IdentityProvider`] (no ambient global), and
//! its state is mutated only by:
//!
//! - the change listener it spawns at start-up (initial lookup, then every
//!   session-change event from the provider), and
//! - [`SessionService::sign_out`].
//!
//! Everyone else reads a snapshot or a [`watch::Receiver`].
//!
//! ```text
//! Loading ──► Anonymous
//!    │
//!    └──────► Authenticated { RoleUnknown ──► RoleKnown(profile) | Missing }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rollcall_core::{PrincipalId, Scope};

use crate::{
    Decision, Destination, GuardPolicy, IdentityToken, Principal, PrincipalOrigin,
    RouteRequirement, Standing, UserProfile, authorize,
};

/// A session handed out by the identity backend, or by the local demo store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: PrincipalId,
    pub token: IdentityToken,
    pub origin: PrincipalOrigin,
}

impl Session {
    pub fn new(user_id: PrincipalId, token: IdentityToken) -> Self {
        Self {
            user_id,
            token,
            origin: PrincipalOrigin::Backend,
        }
    }

    /// Session read from the local demo store.
    pub fn demo(user_id: PrincipalId, token: IdentityToken) -> Self {
        Self {
            origin: PrincipalOrigin::Demo,
            ..Self::new(user_id, token)
        }
    }
}

/// Session-change notification from the identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Identity/session collaborator error. Retryable.
    #[error("session lookup failed: {0}")]
    LookupFailed(String),

    #[error("sign-out failed: {0}")]
    SignOutFailed(String),

    #[error("session service has shut down")]
    Closed,
}

/// Identity/session collaborator (hosted auth, REST backend, local mock...).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// One-shot lookup of the current session.
    async fn current_session(&self) -> Result<Option<Session>, SessionError>;

    /// Ongoing session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Role/approval lookup for a session. `Ok(None)` means no profile row.
    async fn fetch_profile(&self, session: &Session) -> Result<Option<UserProfile>, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

/// Profile resolution for an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    RoleUnknown,
    /// Lookup finished (or gave up) without a profile.
    Missing,
    RoleKnown(UserProfile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated {
        session: Session,
        profile: ProfileState,
    },
}

impl SessionState {
    /// Terminal for the purposes of the guard: a decision can be computed.
    pub fn is_settled(&self) -> bool {
        match self {
            SessionState::Loading => false,
            SessionState::Anonymous => true,
            SessionState::Authenticated { profile, .. } => {
                !matches!(profile, ProfileState::RoleUnknown)
            }
        }
    }

    /// The principal to authorize, or `None` while the lookup is in flight.
    pub fn principal(&self) -> Option<Principal> {
        match self {
            SessionState::Loading => None,
            SessionState::Anonymous => Some(Principal::anonymous()),
            SessionState::Authenticated { session, profile } => {
                let standing = match profile {
                    ProfileState::RoleUnknown => Standing::Unknown,
                    ProfileState::Missing => Standing::Missing,
                    ProfileState::RoleKnown(profile) => profile.standing(),
                };
                Some(Principal {
                    token: Some(session.token.clone()),
                    standing,
                    origin: session.origin,
                })
            }
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated {
                profile: ProfileState::RoleKnown(profile),
                ..
            } => Some(profile),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&IdentityToken> {
        match self {
            SessionState::Authenticated { session, .. } => Some(&session.token),
            SessionState::Loading | SessionState::Anonymous => None,
        }
    }

    /// Guard decision for this state. `Pending` until settled.
    pub fn decide(&self, requirement: &RouteRequirement, policy: &GuardPolicy) -> Decision {
        match self.principal() {
            None => Decision::Pending,
            Some(principal) => authorize(&principal, requirement, policy),
        }
    }
}

/// Session service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Attempts per lookup (session or profile) before giving up.
    pub lookup_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lookup_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl SessionConfig {
    pub fn with_lookup_attempts(mut self, attempts: u32) -> Self {
        self.lookup_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Owner of the current session.
pub struct SessionService {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionState>>,
    lifetime: Scope,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionService")
            .field("state", &*self.state.borrow())
            .field("shut_down", &self.lifetime.is_cancelled())
            .finish()
    }
}

impl SessionService {
    /// Start the service: subscribe to changes, then look up the current
    /// session in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(provider: Arc<dyn IdentityProvider>, config: SessionConfig) -> Self {
        let state = Arc::new(watch::channel(SessionState::Loading).0);
        let lifetime = Scope::new();

        // Subscribe before the initial lookup so no change slips in between.
        let events = provider.subscribe();
        let listener = Listener {
            provider: provider.clone(),
            state: state.clone(),
            lifetime: lifetime.clone(),
            config,
        };
        let handle = tokio::spawn(listener.run(events));

        Self {
            provider,
            state,
            lifetime,
            listener: Mutex::new(Some(handle)),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Read-only subscription to state changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolves with the first settled state.
    pub async fn settled(&self) -> Result<SessionState, SessionError> {
        let mut rx = self.state.subscribe();
        let wait = async move {
            let state = rx
                .wait_for(SessionState::is_settled)
                .await
                .map_err(|_| SessionError::Closed)?
                .clone();
            Ok::<SessionState, SessionError>(state)
        };
        self.lifetime.run(wait).await.unwrap_or(Err(SessionError::Closed))
    }

    /// Immediate guard decision from the current snapshot.
    pub fn decision(&self, requirement: &RouteRequirement, policy: &GuardPolicy) -> Decision {
        self.state.borrow().decide(requirement, policy)
    }

    /// Guard decision once the session has settled.
    ///
    /// Returns `None` if `scope` is cancelled first (the consumer went away).
    /// A shut-down service denies.
    pub async fn decide(
        &self,
        requirement: &RouteRequirement,
        policy: &GuardPolicy,
        scope: &Scope,
    ) -> Option<Decision> {
        match scope.run(self.settled()).await? {
            Ok(state) => Some(state.decide(requirement, policy)),
            Err(_) => Some(Decision::RedirectToHome),
        }
    }

    /// Sign out and clear the session.
    ///
    /// Local state is cleared even when the backend call fails; on success the
    /// caller should navigate to the returned destination.
    pub async fn sign_out(&self) -> Result<Destination, SessionError> {
        if self.lifetime.is_cancelled() {
            return Err(SessionError::Closed);
        }

        let result = self.provider.sign_out().await;

        if !self.lifetime.is_cancelled() {
            self.state.send_replace(SessionState::Anonymous);
        }

        match result {
            Ok(()) => {
                info!("signed out");
                Ok(Destination::Entry)
            }
            Err(err) => {
                warn!(error = %err, "backend sign-out failed; local session cleared");
                Err(SessionError::SignOutFailed(err.to_string()))
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Stop the change listener. No state change happens afterwards.
    pub fn shutdown(&self) {
        self.lifetime.cancel();
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SessionService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Listener {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionState>>,
    lifetime: Scope,
    config: SessionConfig,
}

impl Listener {
    async fn run(self, mut events: broadcast::Receiver<AuthEvent>) {
        let mut pending = self.load_current_session().await;

        loop {
            let event = match pending.take() {
                Some(session) => match self.lifetime.run(self.resolve(session, &mut events)).await {
                    None => break,
                    Some(None) => continue,
                    Some(Some(interrupted_by)) => interrupted_by,
                },
                None => match self.lifetime.run(events.recv()).await {
                    None => break,
                    Some(event) => event,
                },
            };

            pending = match event {
                Ok(AuthEvent::SignedIn(session)) | Ok(AuthEvent::TokenRefreshed(session)) => {
                    Some(session)
                }
                Ok(AuthEvent::SignedOut) => {
                    info!("signed out by identity provider");
                    self.publish(SessionState::Anonymous);
                    None
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "missed session events; reloading current session");
                    self.load_current_session().await
                }
                Err(RecvError::Closed) => {
                    debug!("identity provider closed its event stream");
                    break;
                }
            };
        }
    }

    /// Initial (or recovery) lookup. Returns the session whose profile still
    /// needs resolving.
    async fn load_current_session(&self) -> Option<Session> {
        let provider = self.provider.clone();
        let lookup = with_retries("session", &self.config, || {
            let provider = provider.clone();
            async move { provider.current_session().await }
        })
        .await;

        match lookup {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                self.publish(SessionState::Anonymous);
                None
            }
            Err(err) => {
                warn!(error = %err, "session lookup gave up; treating caller as anonymous");
                self.publish(SessionState::Anonymous);
                None
            }
        }
    }

    /// Move to `Authenticated` for `session` and resolve its profile.
    ///
    /// The lookup is abandoned as soon as the provider reports another session
    /// change; that event is handed back to the caller and the half-finished
    /// answer never lands.
    async fn resolve(
        &self,
        session: Session,
        events: &mut broadcast::Receiver<AuthEvent>,
    ) -> Option<Result<AuthEvent, RecvError>> {
        let unchanged = {
            let current = self.state.borrow();
            current.token() == Some(&session.token) && current.is_settled()
        };
        if unchanged {
            debug!(user_id = %session.user_id, "session event for current token; keeping profile");
            return None;
        }

        info!(user_id = %session.user_id, "session established; resolving profile");
        self.publish(SessionState::Authenticated {
            session: session.clone(),
            profile: ProfileState::RoleUnknown,
        });

        let lookup = self.lookup_profile(&session);
        tokio::pin!(lookup);

        let outcome = tokio::select! {
            biased;
            event = events.recv() => Err(event),
            profile = &mut lookup => Ok(profile),
        };
        let profile = match outcome {
            Ok(profile) => profile,
            // No further events can arrive; let the lookup finish.
            Err(Err(RecvError::Closed)) => lookup.await,
            Err(event) => {
                debug!(user_id = %session.user_id, "session changed during profile lookup; abandoning it");
                return Some(event);
            }
        };

        if self.lifetime.is_cancelled() {
            return None;
        }

        // Only land the answer if this token is still the current one.
        let applied = self.state.send_if_modified(|state| match state {
            SessionState::Authenticated {
                session: current,
                profile: slot,
            } if current.token == session.token => {
                *slot = profile;
                true
            }
            _ => false,
        });
        if !applied {
            debug!(user_id = %session.user_id, "discarding profile for superseded session");
        }
        None
    }

    async fn lookup_profile(&self, session: &Session) -> ProfileState {
        let provider = self.provider.clone();
        let lookup = with_retries("profile", &self.config, || {
            let provider = provider.clone();
            let session = session.clone();
            async move { provider.fetch_profile(&session).await }
        })
        .await;

        match lookup {
            Ok(Some(profile)) => {
                info!(user_id = %session.user_id, role = %profile.role, approval = %profile.approval, "profile resolved");
                ProfileState::RoleKnown(profile)
            }
            Ok(None) => {
                warn!(user_id = %session.user_id, "no profile for session");
                ProfileState::Missing
            }
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "profile lookup gave up");
                ProfileState::Missing
            }
        }
    }

    fn publish(&self, next: SessionState) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.state.send_replace(next);
    }
}

async fn with_retries<T, F, Fut>(
    what: &'static str,
    config: &SessionConfig,
    mut op: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let attempts = config.lookup_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(what, attempt, error = %err, "lookup failed; retrying");
                tokio::time::sleep(config.retry_delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
